use serde::de::DeserializeOwned;

use crate::error::RequestError;
use crate::{Collection, RecordList};

/// Maximum page size the backend accepts.
const MAX_BATCH_SIZE: u16 = 500;

/// Builder for fetching all records from a collection.
pub struct CollectionGetFullListBuilder<'a, T> {
    collection: &'a Collection<'a>,
    batch_size: u16,
    filter: Option<&'a str>,
    _marker: std::marker::PhantomData<T>,
}

impl<'a> Collection<'a> {
    /// Fetch all records from the collection.
    ///
    /// Automatically handles pagination by iterating through all pages.
    /// For performance, `skipTotal` is always set to `true`.
    #[must_use]
    pub const fn get_full_list<T: DeserializeOwned>(&'a self) -> CollectionGetFullListBuilder<'a, T> {
        CollectionGetFullListBuilder {
            collection: self,
            batch_size: MAX_BATCH_SIZE,
            filter: None,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'a, T: DeserializeOwned> CollectionGetFullListBuilder<'a, T> {
    /// Filter the returned records, e.g. `userId='abc' && returned=false`.
    #[must_use]
    pub const fn filter(mut self, filter: &'a str) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Execute the request and return all matching records.
    pub async fn call(self) -> Result<Vec<T>, RequestError> {
        let client = self.collection.client;
        let url = format!(
            "{}/api/collections/{}/records",
            client.base_url(),
            self.collection.name
        );

        let mut all_records = Vec::new();
        let mut page = 1u32;
        let batch_size_str = self.batch_size.to_string();

        loop {
            let page_str = page.to_string();
            let mut query_parameters: Vec<(&str, &str)> = vec![
                ("page", &page_str),
                ("perPage", &batch_size_str),
                ("skipTotal", "true"),
            ];

            if let Some(filter) = self.filter {
                query_parameters.push(("filter", filter));
            }

            let response = match client.request_get(&url, Some(query_parameters)).send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => return Err(RequestError::from_status(response.status())),
                Err(error) => return Err(RequestError::from_transport(&error)),
            };

            let records_page = response
                .json::<RecordList<T>>()
                .await
                .map_err(|error| RequestError::ParseError(error.to_string()))?;

            let items_count = records_page.items.len();
            all_records.extend(records_page.items);

            // skipTotal hides the page count; a short page is the last one.
            if items_count < usize::from(self.batch_size) {
                break;
            }

            page += 1;
        }

        Ok(all_records)
    }
}
