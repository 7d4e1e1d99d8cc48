//! The REST backend as the client's three collaborators.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::collaborators::{
    split_blob_path, AuthProvider, BlobStore, Document, DocumentStore, Fields, Filter, Session,
    Snapshot, Subscription, Upload,
};
use crate::error::{AuthError, BackendError, RequestError, WriteError};
use crate::{BackendClient, Form, Part};

/// Field of a blob record that holds the file.
const BLOB_FIELD: &str = "file";

/// Record metadata that is not part of a document's fields.
const RECORD_META: [&str; 4] = ["id", "collectionId", "collectionName", "expand"];

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

const SNAPSHOT_BUFFER: usize = 16;

impl BackendClient {
    /// Resumes a session persisted by an earlier run and republishes it.
    pub async fn restore_session(&self, token: &str) -> Result<Session, AuthError> {
        match self.collection(self.auth_collection()).auth_refresh(token).await {
            Ok(auth_store) => Ok(Session::from(&auth_store.record)),
            Err(RequestError::Unauthorized | RequestError::NotFound) => {
                self.clear_auth_store();
                Err(AuthError::NotSignedIn)
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl AuthProvider for BackendClient {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let uid = self
            .collection(self.auth_collection())
            .create_account(email, password)
            .await?;
        debug!(%uid, "account created");

        self.sign_in(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let auth_store = self
            .collection(self.auth_collection())
            .auth_with_password(email, password)
            .await?;

        Ok(Session::from(&auth_store.record))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.clear_auth_store();
        Ok(())
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.subscribe_session()
    }

    async fn send_verification_email(&self, session: &Session) -> Result<(), AuthError> {
        self.collection(self.auth_collection())
            .request_verification(&session.email)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for BackendClient {
    async fn get_one(&self, collection: &str, key: &str) -> Result<Option<Document>, BackendError> {
        match self.collection(collection).get_one::<Value>(key).await {
            Ok(record) => record_to_document(record).map(Some),
            Err(RequestError::NotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn set(&self, collection: &str, key: &str, fields: Fields) -> Result<(), BackendError> {
        let records = self.collection(collection);

        match records.update(key, &fields).await {
            Ok(_) => Ok(()),
            Err(WriteError::NotFound) => {
                let mut fields = fields;
                fields.insert("id".to_owned(), Value::String(key.to_owned()));
                records.create(&fields).await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn merge(&self, collection: &str, key: &str, fields: Fields) -> Result<(), BackendError> {
        self.collection(collection).update(key, &fields).await?;
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, BackendError> {
        let created = self.collection(collection).create(&fields).await?;
        Ok(created.id)
    }

    async fn subscribe(&self, collection: &str, filter: Filter) -> Result<Subscription, BackendError> {
        let (sender, receiver) = mpsc::channel(SNAPSHOT_BUFFER);

        let live = LiveQuery {
            client: self.clone(),
            topic: filter.target_id().map_or_else(
                || format!("{collection}/*"),
                |id| format!("{collection}/{id}"),
            ),
            collection: collection.to_owned(),
            filter: render_filter(&filter),
        };

        let worker = tokio::spawn(live.run(sender));

        Ok(Subscription::new(receiver, worker))
    }
}

#[async_trait]
impl BlobStore for BackendClient {
    async fn upload(&self, path: &str, upload: Upload) -> Result<(), BackendError> {
        let (bucket, key) = split_blob_path(path)?;
        let records = self.collection(bucket);

        match records.update_multipart(key, file_form(&upload)?).await {
            Ok(_) => Ok(()),
            Err(WriteError::NotFound) => {
                records
                    .create_multipart(file_form(&upload)?.text("id", key.to_owned()))
                    .await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn download_url(&self, path: &str) -> Result<String, BackendError> {
        let (bucket, key) = split_blob_path(path)?;

        let record = match self.collection(bucket).get_one::<Value>(key).await {
            Ok(record) => record,
            Err(RequestError::NotFound) => return Err(BackendError::BlobNotFound(path.to_owned())),
            Err(error) => return Err(error.into()),
        };

        match record.get(BLOB_FIELD).and_then(Value::as_str) {
            Some(file_name) if !file_name.is_empty() => Ok(self.file_url(bucket, key, file_name)),
            _ => Err(BackendError::BlobNotFound(path.to_owned())),
        }
    }
}

/// A live query kept current through the realtime stream.
struct LiveQuery {
    client: BackendClient,
    collection: String,
    topic: String,
    filter: String,
}

impl LiveQuery {
    async fn run(self, sender: mpsc::Sender<Snapshot>) {
        let topics = [self.topic.clone()];

        loop {
            let mut stream = match self.client.realtime_connect(&topics).await {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(topic = %self.topic, %error, "realtime connection failed");
                    if sender.send(Err(error.into())).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            // Fetched after the topic is registered so no change falls in between.
            if !self.push_snapshot(&sender).await {
                return;
            }

            while let Some(event) = stream.next_event().await {
                debug!(topic = %self.topic, event = %event.event, id = ?event.id, "realtime change");
                if !self.push_snapshot(&sender).await {
                    return;
                }
            }

            debug!(topic = %self.topic, "realtime stream closed, reconnecting");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Sends the current result set; `false` once nobody listens anymore.
    async fn push_snapshot(&self, sender: &mpsc::Sender<Snapshot>) -> bool {
        let records = self.client.collection(&self.collection);
        let mut query = records.get_full_list::<Value>();
        if !self.filter.is_empty() {
            query = query.filter(&self.filter);
        }

        let snapshot: Snapshot = match query.call().await {
            Ok(items) => items.into_iter().map(record_to_document).collect(),
            Err(error) => Err(error.into()),
        };

        sender.send(snapshot).await.is_ok()
    }
}

/// Splits a REST record into key and fields.
fn record_to_document(record: Value) -> Result<Document, BackendError> {
    let Value::Object(mut fields) = record else {
        return Err(BackendError::Malformed("record is not an object".to_owned()));
    };

    let id = match fields.get("id") {
        Some(Value::String(id)) => id.clone(),
        _ => return Err(BackendError::Malformed("record without id".to_owned())),
    };

    for key in RECORD_META {
        fields.remove(key);
    }

    Ok(Document::new(id, fields))
}

/// Renders an equality filter in the backend's filter syntax.
pub(crate) fn render_filter(filter: &Filter) -> String {
    filter
        .clauses()
        .iter()
        .map(|(field, value)| format!("{field}={}", render_value(value)))
        .collect::<Vec<_>>()
        .join(" && ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Null => "null".to_owned(),
        other => other.to_string(),
    }
}

fn file_form(upload: &Upload) -> Result<Form, BackendError> {
    let part = Part::bytes(upload.bytes.clone())
        .file_name(upload.file_name.clone())
        .mime_str(&upload.content_type)
        .map_err(|error| BackendError::Malformed(error.to_string()))?;

    Ok(Form::new().part(BLOB_FIELD, part))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filters_render_as_backend_expressions() {
        let filter = Filter::eq("userId", "u1").and("returned", false);
        assert_eq!(render_filter(&filter), "userId='u1' && returned=false");
        assert_eq!(render_filter(&Filter::all()), "");
    }

    #[test]
    fn quotes_in_values_are_escaped() {
        let filter = Filter::eq("bookTitle", "Ender's Game");
        assert_eq!(render_filter(&filter), r"bookTitle='Ender\'s Game'");
    }

    #[test]
    fn record_metadata_is_stripped() {
        let document = record_to_document(json!({
            "id": "b1",
            "collectionId": "pbc_1",
            "collectionName": "books",
            "title": "Dune",
            "created": "2024-01-01 00:00:00.000Z",
        }))
        .unwrap();

        assert_eq!(document.id, "b1");
        assert_eq!(document.fields.get("title"), Some(&json!("Dune")));
        assert!(!document.fields.contains_key("collectionName"));
        assert!(document.fields.contains_key("created"));
    }

    #[test]
    fn records_without_id_are_malformed() {
        assert!(matches!(
            record_to_document(json!({"title": "x"})),
            Err(BackendError::Malformed(_))
        ));
    }
}
