use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{BadRequestError, BadRequestResponse};
use crate::Collection;

/// Represents the various errors that can be obtained after a `create` or `update` request.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The backend answered with a [400 Bad Request]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/400").
    ///
    /// One or more fields were missing or did not validate.
    #[error("Failed to write record: {0:?}")]
    BadRequest(Vec<BadRequestError>),
    /// The backend answered with a [403 Forbidden]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/403").
    ///
    /// You are not allowed to perform this request.
    #[error("You are not allowed to perform this request.")]
    Forbidden,
    /// The backend answered with a [404 Not Found]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/404").
    ///
    /// The record (or the collection) doesn't exist.
    #[error("The requested resource wasn't found.")]
    NotFound,
    /// Communication with the backend failed.
    ///
    /// This could be caused by an internet outage, a wrong base URL and similar errors.
    #[error("The communication with the backend failed: {0}")]
    Unreachable(String),
    /// The response could not be parsed into the expected data structure.
    #[error("Could not parse response into the expected data structure: {0}")]
    ParseError(String),
    /// The backend answered with a status this client does not handle.
    #[error("An unhandled status code was returned by the backend: {0}")]
    UnexpectedResponse(String),
}

/// The record as stored by the backend after a successful write.
#[derive(Deserialize, Clone, Debug)]
pub struct WriteResponse {
    /// Id of the written record.
    pub id: String,
    /// Every other field of the record, including generated file names.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Collection<'_> {
    /// Create a new record from any serializable value.
    ///
    /// For file uploads, use [`Collection::create_multipart()`].
    pub async fn create<T: Serialize + ?Sized>(
        &self,
        record: &T,
    ) -> Result<WriteResponse, WriteError> {
        let endpoint = format!(
            "{}/api/collections/{}/records",
            self.client.base_url(),
            self.name
        );

        let request = self
            .client
            .request_post_json(&endpoint, record)
            .send()
            .await;

        write_processing(request).await
    }

    /// Create a new record with multipart form data (e.g., for file uploads).
    ///
    /// For simple JSON records without files, use [`Collection::create()`].
    pub async fn create_multipart(
        &self,
        form: reqwest::multipart::Form,
    ) -> Result<WriteResponse, WriteError> {
        let endpoint = format!(
            "{}/api/collections/{}/records",
            self.client.base_url(),
            self.name
        );

        let request = self.client.request_post_form(&endpoint, form).send().await;

        write_processing(request).await
    }
}

/// Turns the raw outcome of a record write into a [`WriteResponse`].
pub(crate) async fn write_processing(
    request: Result<reqwest::Response, reqwest::Error>,
) -> Result<WriteResponse, WriteError> {
    match request {
        Ok(response) => match response.status() {
            reqwest::StatusCode::OK => response
                .json::<WriteResponse>()
                .await
                .map_err(|error| WriteError::ParseError(error.to_string())),

            reqwest::StatusCode::BAD_REQUEST => {
                let data = response.json::<BadRequestResponse>().await;

                match data {
                    Ok(bad_response) => Err(WriteError::BadRequest(bad_response.into_errors())),
                    Err(error) => Err(WriteError::ParseError(error.to_string())),
                }
            }

            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::UNAUTHORIZED => {
                Err(WriteError::Forbidden)
            }
            reqwest::StatusCode::NOT_FOUND => Err(WriteError::NotFound),

            _ => Err(WriteError::UnexpectedResponse(
                response.status().to_string(),
            )),
        },

        Err(error) => Err(WriteError::Unreachable(error.to_string())),
    }
}
