use crate::BackendClient;

impl BackendClient {
    /// Public URL of a file stored in a record's file field.
    #[must_use]
    pub fn file_url(&self, collection: &str, record_id: &str, file_name: &str) -> String {
        format!(
            "{}/api/files/{}/{}/{}",
            self.base_url(),
            collection,
            record_id,
            file_name
        )
    }
}
