//! The three backend collaborators the client talks to, and the values
//! that cross that boundary.
//!
//! Everything behind these traits is owned by the managed backend: the
//! client never assumes more than what the trait contracts state.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{AuthError, BackendError};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// Snapshot of the authenticated account, as delivered by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque account identifier.
    pub uid: String,
    /// Email the account signed in with.
    pub email: String,
    /// Whether the account confirmed its email address.
    pub email_verified: bool,
}

/// A document read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Key of the document in its collection.
    pub id: String,
    /// Stored fields, without the key.
    pub fields: Fields,
}

impl Document {
    /// Builds a document from its key and fields.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Raw value of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == "id" {
            return None;
        }
        self.fields.get(field)
    }

    /// Deserializes the document, exposing its key as the `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_owned(), Value::String(self.id.clone()));

        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Conjunction of equality predicates over document fields.
///
/// The pseudo-field `id` matches the document key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document of the collection.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches documents whose `field` equals `value`.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    /// Matches only the document stored under `key`.
    #[must_use]
    pub fn by_id(key: impl Into<String>) -> Self {
        Self::eq("id", key.into())
    }

    /// Adds one more equality predicate.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// The predicates, in insertion order.
    #[must_use]
    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// The document key this filter pins down, if it is a pure key lookup.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        match self.clauses.as_slice() {
            [(field, Value::String(id))] if field == "id" => Some(id),
            _ => None,
        }
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            if field == "id" {
                return expected.as_str() == Some(document.id.as_str());
            }
            document.fields.get(field) == Some(expected)
        })
    }
}

/// Snapshots delivered by a live query.
pub type Snapshot = Result<Vec<Document>, BackendError>;

/// A live query. Each item is the full, current result set.
///
/// Dropping the subscription releases it: the worker feeding it is aborted.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Snapshot>,
    worker: JoinHandle<()>,
}

impl Subscription {
    /// Wraps the receiving end of a worker task that pushes snapshots.
    #[must_use]
    pub const fn new(receiver: mpsc::Receiver<Snapshot>, worker: JoinHandle<()>) -> Self {
        Self { receiver, worker }
    }

    /// Waits for the next snapshot; `None` once the collaborator closed the query.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Binary content handed to the blob collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`.
    pub content_type: String,
    /// File name reported to the backend.
    pub file_name: String,
}

impl Upload {
    /// A JPEG image, the format the image picker hands over.
    #[must_use]
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "image/jpeg".to_owned(),
            file_name: "image.jpg".to_owned(),
        }
    }
}

/// Splits a blob path `<bucket>/<key>`.
pub(crate) fn split_blob_path(path: &str) -> Result<(&str, &str), BackendError> {
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() && !key.contains('/') => {
            Ok((bucket, key))
        }
        _ => Err(BackendError::InvalidPath(path.to_owned())),
    }
}

/// Authentication collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Registers an account and signs it in.
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Signs an existing account in.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Ends the current session, if any.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Listener on the current session. The current value is always resolved.
    fn watch_session(&self) -> watch::Receiver<Option<Session>>;

    /// Asks the service to email a verification link to the session's address.
    async fn send_verification_email(&self, session: &Session) -> Result<(), AuthError>;
}

/// Document-database collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup; a missing document is `Ok(None)`.
    async fn get_one(&self, collection: &str, key: &str) -> Result<Option<Document>, BackendError>;

    /// Creates the document under `key`, or overwrites the given fields of an existing one.
    async fn set(&self, collection: &str, key: &str, fields: Fields) -> Result<(), BackendError>;

    /// Updates the given fields of an existing document, leaving the rest intact.
    async fn merge(&self, collection: &str, key: &str, fields: Fields)
        -> Result<(), BackendError>;

    /// Creates a document under a generated key and returns that key.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, BackendError>;

    /// Live query: the current result set first, then a new one after every change.
    async fn subscribe(&self, collection: &str, filter: Filter)
        -> Result<Subscription, BackendError>;
}

/// Blob-storage collaborator. Paths are `<bucket>/<key>`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores (or replaces) the blob at `path`.
    async fn upload(&self, path: &str, upload: Upload) -> Result<(), BackendError>;

    /// Public URL the blob at `path` can be downloaded from.
    async fn download_url(&self, path: &str) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(id: &str, value: Value) -> Document {
        let Value::Object(fields) = value else {
            panic!("fixture must be an object");
        };
        Document::new(id, fields)
    }

    #[test]
    fn filter_matches_on_fields_and_key() {
        let record = document("r1", json!({"userId": "u1", "returned": false}));

        assert!(Filter::eq("userId", "u1").matches(&record));
        assert!(Filter::eq("userId", "u1").and("returned", false).matches(&record));
        assert!(Filter::by_id("r1").matches(&record));
        assert!(!Filter::eq("userId", "u2").matches(&record));
        assert!(!Filter::eq("missing", "x").matches(&record));
        assert!(Filter::all().matches(&record));
    }

    #[test]
    fn target_id_only_for_pure_key_lookups() {
        assert_eq!(Filter::by_id("abc").target_id(), Some("abc"));
        assert_eq!(Filter::eq("userId", "abc").target_id(), None);
        assert_eq!(Filter::by_id("abc").and("x", 1).target_id(), None);
    }

    #[test]
    fn decode_exposes_the_key_as_id() {
        #[derive(serde::Deserialize)]
        struct Row {
            id: String,
            title: String,
        }

        let row: Row = document("b1", json!({"title": "Dune"})).decode().unwrap();

        assert_eq!(row.id, "b1");
        assert_eq!(row.title, "Dune");
    }

    #[test]
    fn blob_paths_need_bucket_and_key() {
        assert_eq!(split_blob_path("profilePictures/u1").unwrap(), ("profilePictures", "u1"));
        assert!(split_blob_path("u1").is_err());
        assert!(split_blob_path("a/b/c").is_err());
        assert!(split_blob_path("/u1").is_err());
    }
}
