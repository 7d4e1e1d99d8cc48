use std::collections::HashMap;

use crate::error::RequestError;
use crate::Collection;

impl Collection<'_> {
    /// Asks the backend to send a verification email to `email`.
    pub async fn request_verification(&self, email: &str) -> Result<(), RequestError> {
        let url = format!(
            "{}/api/collections/{}/request-verification",
            self.client.base_url(),
            self.name
        );

        let email: HashMap<&str, &str> = HashMap::from([("email", email)]);

        let request = self.client.request_post_json(&url, &email).send().await;

        match request {
            Ok(response) => match response.status() {
                reqwest::StatusCode::NO_CONTENT | reqwest::StatusCode::OK => Ok(()),
                status => Err(RequestError::from_status(status)),
            },
            Err(error) => Err(RequestError::from_transport(&error)),
        }
    }
}
