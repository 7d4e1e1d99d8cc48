use crate::error::RequestError;
use crate::{AuthStore, Collection};

impl Collection<'_> {
    /// Returns a new auth response (token and record data) for an **already authenticated record**.
    ///
    /// Called at start-up with a persisted token so that the session the
    /// backend still considers valid is published again.
    pub async fn auth_refresh(&self, token: &str) -> Result<AuthStore, RequestError> {
        let url = format!(
            "{}/api/collections/{}/auth-refresh",
            self.client.base_url(),
            self.name
        );

        let request = self.client.http().post(&url).bearer_auth(token).send().await;

        match request {
            Ok(response) => match response.status() {
                reqwest::StatusCode::OK => {
                    let auth_store = response
                        .json::<AuthStore>()
                        .await
                        .map_err(|error| RequestError::ParseError(error.to_string()))?;

                    self.client.update_auth_store(auth_store.clone());

                    Ok(auth_store)
                }

                status => Err(RequestError::from_status(status)),
            },
            Err(error) => Err(RequestError::from_transport(&error)),
        }
    }
}
