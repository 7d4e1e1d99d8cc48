use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::{AuthError, BadRequestResponse};
use crate::{AuthStore, Collection};

#[derive(Serialize)]
struct Credentials<'a> {
    identity: &'a str,
    password: &'a str,
}

/// Represents errors that can occur while signing in with email and password.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    /// The backend answered with a [400 Bad Request]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/400")
    /// and no field errors: email and password do not match an account.
    #[error("Authentication failed: the email and/or password is wrong.")]
    InvalidCredentials,
    /// Email and/or password was left blank.
    #[error("Authentication failed: email and password are both required.")]
    MissingCredentials,
    /// The identity is not an email address.
    #[error("Authentication failed: the identity is not a valid email.")]
    IdentityMustBeEmail,
    /// The request could not be completed: network issues, invalid URL, timeouts...
    #[error("Authentication failed: couldn't reach the backend: {0}")]
    Unreachable(String),
    /// Any status or body this client does not expect.
    #[error("Authentication failed due to an unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<AuthenticationError> for AuthError {
    fn from(error: AuthenticationError) -> Self {
        match error {
            AuthenticationError::InvalidCredentials | AuthenticationError::MissingCredentials => {
                Self::InvalidCredentials
            }
            AuthenticationError::IdentityMustBeEmail => Self::InvalidEmail,
            AuthenticationError::Unreachable(_) => Self::Unreachable,
            AuthenticationError::UnexpectedResponse(detail) => Self::Service(detail),
        }
    }
}

impl Collection<'_> {
    /// Signs an account of this auth collection in.
    ///
    /// On success, the token is kept for every following request and the
    /// account's session is published to session listeners.
    pub async fn auth_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthStore, AuthenticationError> {
        let url = format!(
            "{}/api/collections/{}/auth-with-password",
            self.client.base_url(),
            self.name
        );

        let credentials = Credentials {
            identity: email,
            password,
        };

        let response = self
            .client
            .request_post_json(&url, &credentials)
            .send()
            .await
            .map_err(|error| AuthenticationError::Unreachable(error.to_string()))?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let auth_store = response
                    .json::<AuthStore>()
                    .await
                    .map_err(|error| AuthenticationError::UnexpectedResponse(error.to_string()))?;

                debug!(uid = %auth_store.record.id, verified = auth_store.record.verified, "authenticated");
                self.client.update_auth_store(auth_store.clone());

                Ok(auth_store)
            }
            reqwest::StatusCode::BAD_REQUEST => {
                // {"status": 400, "message": "Failed to authenticate.", "data": {}}
                let body = response.json::<BadRequestResponse>().await.ok();
                Err(body.map_or(AuthenticationError::InvalidCredentials, classify))
            }
            status => Err(AuthenticationError::UnexpectedResponse(status.to_string())),
        }
    }
}

/// Reads the field errors of a rejected sign-in.
fn classify(body: BadRequestResponse) -> AuthenticationError {
    let errors = body.into_errors();

    if errors
        .iter()
        .any(|error| error.name == "identity" && error.code == "validation_is_email")
    {
        return AuthenticationError::IdentityMustBeEmail;
    }

    if errors.iter().any(|error| error.code == "validation_required") {
        return AuthenticationError::MissingCredentials;
    }

    AuthenticationError::InvalidCredentials
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> BadRequestResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn empty_data_means_wrong_credentials() {
        let error = classify(body(r#"{"status":400,"message":"Failed to authenticate.","data":{}}"#));
        assert!(matches!(error, AuthenticationError::InvalidCredentials));
    }

    #[test]
    fn field_errors_are_told_apart() {
        let error = classify(body(
            r#"{"status":400,"message":"x","data":{"identity":{"code":"validation_is_email","message":"m"}}}"#,
        ));
        assert!(matches!(error, AuthenticationError::IdentityMustBeEmail));

        let error = classify(body(
            r#"{"status":400,"message":"x","data":{"password":{"code":"validation_required","message":"m"}}}"#,
        ));
        assert!(matches!(error, AuthenticationError::MissingCredentials));
    }
}
