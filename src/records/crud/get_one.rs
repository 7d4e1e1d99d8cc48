use serde::de::DeserializeOwned;

use crate::error::RequestError;
use crate::Collection;

impl Collection<'_> {
    /// Fetch a single record.
    ///
    /// A missing record is reported as [`RequestError::NotFound`].
    pub async fn get_one<T: DeserializeOwned>(&self, record_id: &str) -> Result<T, RequestError> {
        let url = format!(
            "{}/api/collections/{}/records/{}",
            self.client.base_url(),
            self.name,
            record_id
        );

        let response = match self.client.request_get(&url, None).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => return Err(RequestError::from_status(response.status())),
            Err(error) => return Err(RequestError::from_transport(&error)),
        };

        response
            .json::<T>()
            .await
            .map_err(|error| RequestError::ParseError(error.to_string()))
    }
}
