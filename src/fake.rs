//! In-memory collaborators.
//!
//! [`FakeBackend`] implements [`AuthProvider`], [`DocumentStore`] and
//! [`BlobStore`] with the semantics of the real backend, plus a few
//! administrator controls so a test can play the part of the library staff.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::collaborators::{
    split_blob_path, AuthProvider, BlobStore, Document, DocumentStore, Fields, Filter, Session,
    Snapshot, Subscription, Upload,
};
use crate::config::DEFAULT_ACCOUNTS_COLLECTION;
use crate::error::{AuthError, BackendError};
use crate::session::APPROVAL_FIELD;

/// Shortest password the fake auth service accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

const FAKE_BLOB_HOST: &str = "https://blobs.booknook.test";

/// Shared in-memory backend. Clones share state.
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    state: Mutex<FakeState>,
    session: watch::Sender<Option<Session>>,
    revision: watch::Sender<u64>,
}

#[derive(Default)]
struct FakeState {
    accounts: Vec<FakeAccount>,
    collections: HashMap<String, BTreeMap<String, Fields>>,
    blobs: HashMap<String, Upload>,
    next_id: u64,
    failing_reads: usize,
    read_delay: Option<Duration>,
    verification_requests: Vec<String>,
}

struct FakeAccount {
    uid: String,
    email: String,
    password: String,
    verified: bool,
}

impl FakeAccount {
    fn session(&self) -> Session {
        Session {
            uid: self.uid.clone(),
            email: self.email.clone(),
            email_verified: self.verified,
        }
    }
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("FakeBackend")
            .field("accounts", &state.accounts.len())
            .field("collections", &state.collections.keys().collect::<Vec<_>>())
            .field("blobs", &state.blobs.len())
            .finish_non_exhaustive()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// An empty backend with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        let (revision, _) = watch::channel(0);

        Self {
            inner: Arc::new(FakeInner {
                state: Mutex::new(FakeState::default()),
                session,
                revision,
            }),
        }
    }

    /// Marks the account's email as verified, updating the live session if it is that account.
    pub fn verify_email(&self, email: &str) {
        let session = {
            let mut state = self.inner.state.lock();
            let Some(account) = state.accounts.iter_mut().find(|account| account.email == email) else {
                return;
            };
            account.verified = true;
            account.session()
        };

        self.inner.session.send_if_modified(|current| match current {
            Some(current) if current.uid == session.uid => {
                *current = session;
                true
            }
            _ => false,
        });
    }

    /// Sets the approval flag of an account document, as an administrator would.
    pub fn approve(&self, uid: &str, approved: bool) {
        self.set_field(DEFAULT_ACCOUNTS_COLLECTION, uid, APPROVAL_FIELD, Value::Bool(approved));
    }

    /// Writes one field of a document, creating the document if needed.
    pub fn set_field(&self, collection: &str, key: &str, field: &str, value: Value) {
        self.mutate(|state| {
            state
                .collection_mut(collection)
                .entry(key.to_owned())
                .or_default()
                .insert(field.to_owned(), value);
        });
    }

    /// Stores a whole document.
    pub fn insert(&self, collection: &str, key: &str, fields: Fields) {
        self.mutate(|state| {
            state.collection_mut(collection).insert(key.to_owned(), fields);
        });
    }

    /// Removes a document.
    pub fn remove(&self, collection: &str, key: &str) {
        self.mutate(|state| {
            state.collection_mut(collection).remove(key);
        });
    }

    /// Makes the next `count` point lookups fail as if the backend were offline.
    pub fn fail_next_reads(&self, count: usize) {
        self.inner.state.lock().failing_reads = count;
    }

    /// Delays every point lookup, to keep lookups in flight while a test acts.
    pub fn delay_reads(&self, delay: Option<Duration>) {
        self.inner.state.lock().read_delay = delay;
    }

    /// Email addresses verification mails were requested for, oldest first.
    #[must_use]
    pub fn verification_requests(&self) -> Vec<String> {
        self.inner.state.lock().verification_requests.clone()
    }

    /// Documents currently stored in `collection`, in key order.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .state
            .lock()
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(key, fields)| Document::new(key.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The blob stored at `path`, if any.
    #[must_use]
    pub fn blob(&self, path: &str) -> Option<Upload> {
        self.inner.state.lock().blobs.get(path).cloned()
    }

    /// Session the auth side currently reports.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    fn mutate(&self, apply: impl FnOnce(&mut FakeState)) {
        apply(&mut self.inner.state.lock());
        self.inner.revision.send_modify(|revision| *revision += 1);
    }

    async fn before_read(&self) -> Result<(), BackendError> {
        let delay = self.inner.state.lock().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.inner.state.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(BackendError::Unreachable);
        }
        Ok(())
    }

    fn query(&self, collection: &str, filter: &Filter) -> Vec<Document> {
        self.documents(collection)
            .into_iter()
            .filter(|document| filter.matches(document))
            .collect()
    }
}

impl FakeState {
    fn collection_mut(&mut self, collection: &str) -> &mut BTreeMap<String, Fields> {
        self.collections.entry(collection.to_owned()).or_default()
    }

    fn generate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:06}", self.next_id)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[async_trait]
impl AuthProvider for FakeBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if !is_plausible_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let session = {
            let mut state = self.inner.state.lock();
            if state.accounts.iter().any(|account| account.email.eq_ignore_ascii_case(email)) {
                return Err(AuthError::EmailAlreadyInUse);
            }
            let account = FakeAccount {
                uid: state.generate_id("uid"),
                email: email.to_owned(),
                password: password.to_owned(),
                verified: false,
            };
            let session = account.session();
            state.accounts.push(account);
            session
        };

        debug!(uid = %session.uid, "fake account created");
        self.inner.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self
            .inner
            .state
            .lock()
            .accounts
            .iter()
            .find(|account| account.email.eq_ignore_ascii_case(email) && account.password == password)
            .map(FakeAccount::session)
            .ok_or(AuthError::InvalidCredentials)?;

        self.inner.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.inner.session.send_replace(None);
        Ok(())
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session.subscribe()
    }

    async fn send_verification_email(&self, session: &Session) -> Result<(), AuthError> {
        let mut state = self.inner.state.lock();
        if !state.accounts.iter().any(|account| account.uid == session.uid) {
            return Err(AuthError::NotSignedIn);
        }
        state.verification_requests.push(session.email.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FakeBackend {
    async fn get_one(&self, collection: &str, key: &str) -> Result<Option<Document>, BackendError> {
        self.before_read().await?;

        Ok(self
            .inner
            .state
            .lock()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(key))
            .map(|fields| Document::new(key, fields.clone())))
    }

    async fn set(&self, collection: &str, key: &str, fields: Fields) -> Result<(), BackendError> {
        self.insert(collection, key, fields);
        Ok(())
    }

    async fn merge(&self, collection: &str, key: &str, fields: Fields) -> Result<(), BackendError> {
        let mut found = true;
        self.mutate(|state| match state.collection_mut(collection).get_mut(key) {
            Some(existing) => existing.extend(fields),
            None => found = false,
        });

        if found {
            Ok(())
        } else {
            Err(BackendError::Service(format!("no document {collection}/{key}")))
        }
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, BackendError> {
        let mut key = String::new();
        self.mutate(|state| {
            key = state.generate_id("doc");
            state.collection_mut(collection).insert(key.clone(), fields);
        });
        Ok(key)
    }

    async fn subscribe(&self, collection: &str, filter: Filter) -> Result<Subscription, BackendError> {
        let (sender, receiver) = mpsc::channel::<Snapshot>(16);
        let backend = self.clone();
        let collection = collection.to_owned();
        let mut revision = self.inner.revision.subscribe();

        let worker = tokio::spawn(async move {
            let mut last: Option<Vec<Document>> = None;
            loop {
                revision.mark_unchanged();
                let current = backend.query(&collection, &filter);
                if last.as_ref() != Some(&current) {
                    if sender.send(Ok(current.clone())).await.is_err() {
                        return;
                    }
                    last = Some(current);
                }
                if revision.changed().await.is_err() {
                    return;
                }
            }
        });

        Ok(Subscription::new(receiver, worker))
    }
}

#[async_trait]
impl BlobStore for FakeBackend {
    async fn upload(&self, path: &str, upload: Upload) -> Result<(), BackendError> {
        split_blob_path(path)?;
        self.inner.state.lock().blobs.insert(path.to_owned(), upload);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, BackendError> {
        split_blob_path(path)?;
        if self.inner.state.lock().blobs.contains_key(path) {
            Ok(format!("{FAKE_BLOB_HOST}/{path}"))
        } else {
            Err(BackendError::BlobNotFound(path.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn sign_up_rules_match_the_auth_service() {
        let backend = FakeBackend::new();

        assert_eq!(
            backend.create_account("not-an-email", "secret1").await,
            Err(AuthError::InvalidEmail)
        );
        assert_eq!(
            backend.create_account("a@b.co", "12345").await,
            Err(AuthError::WeakPassword)
        );

        let session = backend.create_account("a@b.co", "123456").await.unwrap();
        assert!(!session.email_verified);
        assert_eq!(
            backend.create_account("A@b.co", "1234567").await,
            Err(AuthError::EmailAlreadyInUse)
        );
    }

    #[tokio::test]
    async fn sign_in_checks_the_password() {
        let backend = FakeBackend::new();
        backend.create_account("a@b.co", "123456").await.unwrap();
        backend.sign_out().await.unwrap();

        assert_eq!(
            backend.sign_in("a@b.co", "654321").await,
            Err(AuthError::InvalidCredentials)
        );
        assert!(backend.current_session().is_none());

        backend.sign_in("a@b.co", "123456").await.unwrap();
        assert!(backend.current_session().is_some());
    }

    #[tokio::test]
    async fn merge_keeps_other_fields_and_needs_an_existing_document() {
        let backend = FakeBackend::new();
        backend.set_field("users", "u1", "username", json!("ana"));

        let mut patch = Fields::new();
        patch.insert("profilePicture".to_owned(), json!("https://x/y.jpg"));
        backend.merge("users", "u1", patch.clone()).await.unwrap();

        let document = backend.get_one("users", "u1").await.unwrap().unwrap();
        assert_eq!(document.get("username"), Some(&json!("ana")));
        assert_eq!(document.get("profilePicture"), Some(&json!("https://x/y.jpg")));

        assert!(backend.merge("users", "missing", patch).await.is_err());
    }

    #[tokio::test]
    async fn failing_reads_recover() {
        let backend = FakeBackend::new();
        backend.fail_next_reads(1);

        assert_eq!(backend.get_one("users", "u1").await, Err(BackendError::Unreachable));
        assert_eq!(backend.get_one("users", "u1").await, Ok(None));
    }

    #[tokio::test]
    async fn subscriptions_emit_only_on_relevant_change() {
        let backend = FakeBackend::new();
        let mut subscription = backend
            .subscribe("borrowHistory", Filter::eq("userId", "u1"))
            .await
            .unwrap();

        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 0);

        backend.set_field("borrowHistory", "other", "userId", json!("u2"));
        backend.set_field("borrowHistory", "mine", "userId", json!("u1"));

        let snapshot = subscription.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "mine");
    }

    #[tokio::test]
    async fn blobs_need_a_valid_path() {
        let backend = FakeBackend::new();
        assert!(backend.download_url("profilePictures/u1").await.is_err());

        backend
            .upload("profilePictures/u1", Upload::jpeg(vec![1, 2, 3]))
            .await
            .unwrap();

        assert_eq!(
            backend.download_url("profilePictures/u1").await.unwrap(),
            "https://blobs.booknook.test/profilePictures/u1"
        );
        assert!(matches!(
            backend.upload("nokey", Upload::jpeg(vec![])).await,
            Err(BackendError::InvalidPath(_))
        ));
    }
}
