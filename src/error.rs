//! Various errors module.
//!
//! The REST layer reports what the backend answered ([`RequestError`],
//! [`WriteError`], [`AuthenticationError`]). The collaborator seam folds
//! those into the two kinds the rest of the crate reasons about:
//! [`AuthError`] for credential problems and [`BackendError`] for
//! everything a document or blob call can hit.

use core::fmt;
use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::records::auth::auth_with_password::AuthenticationError;
pub use crate::records::crud::create::WriteError;

/// This error represents the error returned by the backend
/// in case of a 400 error.
#[derive(Deserialize, Debug)]
pub struct BadRequestResponse {
    /// HTTP Status Code.
    #[serde(alias = "code")]
    pub status: u16,
    /// Description given by the backend about why the error happened.
    pub message: String,
    /// A list of fields that caused the error.
    #[serde(default)]
    pub data: HashMap<String, BadRequestField>,
}

impl BadRequestResponse {
    /// Flattens the per-field map into a list of [`BadRequestError`].
    #[must_use]
    pub fn into_errors(self) -> Vec<BadRequestError> {
        self.data
            .into_iter()
            .map(|(name, field)| BadRequestError {
                name,
                code: field.code,
                message: field.message,
            })
            .collect()
    }
}

/// Represents an instance of one of the errors that could be returned on a bad request.
///
/// This struct holds detailed information about a single validation error,
/// including the field name, error code, and a user-friendly message.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BadRequestError {
    /// Name of the field.
    pub name: String,
    /// Error code.
    pub code: String,
    /// More details about the error.
    pub message: String,
}

impl fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.code, self.message)
    }
}

/// Represents one of the fields that caused the Bad Request error.
#[derive(Deserialize, Debug)]
pub struct BadRequestField {
    /// Error code *(example: `validation_required`)*.
    pub code: String,
    /// A text explaining in a readable way what this error is.
    pub message: String,
}

/// Represents errors when reading from the backend's REST API.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The backend answered with a [400 Bad Request]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/400").
    #[error("Bad Request: Something went wrong while processing your request. {0}")]
    BadRequest(String),
    /// The backend answered with a [401 Unauthorized]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/401").
    ///
    /// The request may require an Authorization Token.
    #[error("Unauthorized: The request may require an Authorization Token.")]
    Unauthorized,
    /// The backend answered with a [403 Forbidden]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/403").
    #[error("Forbidden: The authenticated user may not have permissions for this interaction.")]
    Forbidden,
    /// The backend answered with a [404 Not Found]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/404").
    #[error("Not Found: The requested resource could not be found.")]
    NotFound,
    /// The response could not be parsed into the expected data structure.
    #[error("Parse Error: Could not parse response into the expected data structure. - {0}")]
    ParseError(String),
    /// The request timed out or the backend could not be reached.
    #[error("Unreachable: The backend interaction timed out, or the service may be offline.")]
    Unreachable,
    /// The backend is rate limiting requests.
    #[error("Too Many Requests: The server is rate limiting requests. Please wait before retrying.")]
    TooManyRequests,
    /// Anything else the backend answered.
    #[error("Unhandled Error: An unexpected error occurred.")]
    Unhandled,
}

impl RequestError {
    /// Maps a non-success status code onto the matching variant.
    pub(crate) fn from_status(status: reqwest::StatusCode) -> Self {
        match status {
            reqwest::StatusCode::BAD_REQUEST => Self::BadRequest(String::new()),
            reqwest::StatusCode::UNAUTHORIZED => Self::Unauthorized,
            reqwest::StatusCode::FORBIDDEN => Self::Forbidden,
            reqwest::StatusCode::NOT_FOUND => Self::NotFound,
            reqwest::StatusCode::TOO_MANY_REQUESTS => Self::TooManyRequests,
            _ => Self::Unhandled,
        }
    }

    /// Maps a transport failure; timeouts and refused connections are `Unreachable`.
    pub(crate) fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            return Self::Unreachable;
        }

        error.status().map_or(Self::Unhandled, Self::from_status)
    }
}

/// Credential and session failures reported by the authentication collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// An account with this email already exists.
    #[error("email already registered")]
    EmailAlreadyInUse,
    /// The password does not meet the backend's strength rules.
    #[error("password too weak")]
    WeakPassword,
    /// The email address is malformed.
    #[error("invalid email address")]
    InvalidEmail,
    /// Email and password do not match an account.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The account exists but its email has not been verified.
    #[error("email address not verified")]
    EmailNotVerified,
    /// The operation needs a session and there is none.
    #[error("not signed in")]
    NotSignedIn,
    /// The auth service could not be reached.
    #[error("authentication service unreachable")]
    Unreachable,
    /// Any other failure reported by the auth service.
    #[error("authentication service error: {0}")]
    Service(String),
}

/// Failures of document and blob collaborator calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unreachable")]
    Unreachable,
    /// The session is not allowed to perform this call.
    #[error("permission denied")]
    Forbidden,
    /// The backend rejected the written fields.
    #[error("rejected by the backend: {0:?}")]
    Rejected(Vec<BadRequestError>),
    /// A document or response did not have the expected shape.
    #[error("malformed data: {0}")]
    Malformed(String),
    /// The referenced blob does not exist.
    #[error("blob not found: {0}")]
    BlobNotFound(String),
    /// A blob path was not of the form `<bucket>/<key>`.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    /// Any other failure reported by the backend.
    #[error("backend error: {0}")]
    Service(String),
}

impl From<RequestError> for BackendError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::Unreachable => Self::Unreachable,
            RequestError::Forbidden | RequestError::Unauthorized => Self::Forbidden,
            RequestError::ParseError(detail) => Self::Malformed(detail),
            other => Self::Service(other.to_string()),
        }
    }
}

impl From<WriteError> for BackendError {
    fn from(error: WriteError) -> Self {
        match error {
            WriteError::BadRequest(errors) => Self::Rejected(errors),
            WriteError::Forbidden => Self::Forbidden,
            WriteError::Unreachable(_) => Self::Unreachable,
            WriteError::ParseError(detail) => Self::Malformed(detail),
            other => Self::Service(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}

impl From<RequestError> for AuthError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::Unreachable => Self::Unreachable,
            RequestError::Unauthorized => Self::NotSignedIn,
            other => Self::Service(other.to_string()),
        }
    }
}

impl From<WriteError> for AuthError {
    fn from(error: WriteError) -> Self {
        match error {
            WriteError::BadRequest(errors) => credential_error(&errors),
            WriteError::Unreachable(_) => Self::Unreachable,
            other => Self::Service(other.to_string()),
        }
    }
}

/// Picks the credential kind out of the backend's field validation errors.
pub(crate) fn credential_error(errors: &[BadRequestError]) -> AuthError {
    for error in errors {
        match (error.name.as_str(), error.code.as_str()) {
            ("email", "validation_not_unique") => return AuthError::EmailAlreadyInUse,
            ("email", "validation_is_email" | "validation_required") => {
                return AuthError::InvalidEmail;
            }
            (
                "password",
                "validation_length_out_of_range"
                | "validation_min_text_constraint"
                | "validation_length_too_short",
            ) => return AuthError::WeakPassword,
            _ => {}
        }
    }

    AuthError::Service(
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, code: &str) -> BadRequestError {
        BadRequestError {
            name: name.to_owned(),
            code: code.to_owned(),
            message: String::new(),
        }
    }

    #[test]
    fn duplicate_email_maps_to_email_already_in_use() {
        let error = credential_error(&[field("email", "validation_not_unique")]);
        assert_eq!(error, AuthError::EmailAlreadyInUse);
    }

    #[test]
    fn short_password_maps_to_weak_password() {
        let error = credential_error(&[
            field("passwordConfirm", "validation_values_mismatch"),
            field("password", "validation_length_out_of_range"),
        ]);
        assert_eq!(error, AuthError::WeakPassword);
    }

    #[test]
    fn unknown_codes_are_passed_through() {
        let error = credential_error(&[field("username", "validation_invalid_username")]);
        assert!(matches!(error, AuthError::Service(detail) if detail.contains("username")));
    }

    #[test]
    fn bad_request_body_accepts_legacy_code_key() {
        let body = r#"{"code":400,"message":"Failed","data":{"email":{"code":"validation_is_email","message":"Must be a valid email address."}}}"#;
        let response: BadRequestResponse = serde_json::from_str(body).unwrap();
        let errors = response.into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "validation_is_email");
    }
}
