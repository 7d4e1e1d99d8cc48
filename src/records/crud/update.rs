use serde::Serialize;

use super::create::{write_processing, WriteError, WriteResponse};
use crate::Collection;

impl Collection<'_> {
    /// Update the given fields of a single record; fields left out are kept.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        record_id: &str,
        record: &T,
    ) -> Result<WriteResponse, WriteError> {
        let endpoint = format!(
            "{}/api/collections/{}/records/{}",
            self.client.base_url(),
            self.name,
            record_id
        );

        let request = self
            .client
            .request_patch_json(&endpoint, record)
            .send()
            .await;

        write_processing(request).await
    }

    /// Update a single record with multipart form data (e.g., to replace a file).
    pub async fn update_multipart(
        &self,
        record_id: &str,
        form: reqwest::multipart::Form,
    ) -> Result<WriteResponse, WriteError> {
        let endpoint = format!(
            "{}/api/collections/{}/records/{}",
            self.client.base_url(),
            self.name,
            record_id
        );

        let request = self
            .client
            .request_patch_form(&endpoint, form)
            .send()
            .await;

        write_processing(request).await
    }
}
