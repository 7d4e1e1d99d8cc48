//! `booknook` is the client core of the BookNook lending service.
//!
//! Users register, wait for an administrator to approve them, then browse
//! the catalog, show their library identifier, follow their borrowing
//! history and manage their profile. Everything persistent lives in a
//! managed backend reached through three collaborators
//! ([`AuthProvider`], [`DocumentStore`], [`BlobStore`]); [`BackendClient`]
//! implements all three against a PocketBase-style REST API.
//!
//! # Usage
//!
//! ```rust,ignore
//! use booknook::{App, AppConfig, BackendClient, Collaborators, Route};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     booknook::telemetry::init();
//!
//!     let config = AppConfig::from_env()?;
//!     let client = BackendClient::from_config(&config.backend)?;
//!     if let Some(token) = &config.backend.session_token {
//!         client.restore_session(token).await?;
//!     }
//!     let app = App::start(Collaborators::from_client(&client), &config);
//!
//!     if let Err(notice) = app.sign_in("reader@example.com", "hunter22").await {
//!         eprintln!("{notice}");
//!         return Ok(());
//!     }
//!
//!     if let Some(shell) = app.shell() {
//!         let catalog = shell.catalog().loaded().await;
//!         println!("{}", catalog.greeting());
//!     } else {
//!         assert_eq!(app.route(), Route::Pending);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::RequestBuilder;
pub use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use app::{App, Collaborators, Shell, SignUpForm};
pub use collaborators::{
    AuthProvider, BlobStore, DocumentStore, Document, Fields, Filter, Session, Subscription, Upload,
};
pub use config::{AppConfig, BackendConfig, Collections, SessionConfig};
pub use error::*;
pub use gate::Route;
pub use models::{Account, Book, BorrowRecord, Suggestion};
pub use notice::Notice;
pub use records::auth::{AuthStore, AuthStoreRecord};
pub use session::{Approval, SessionObserver, SessionState, SessionStore};
pub use views::{CatalogState, CatalogView, HistoryView, IdentifierView, Loadable, ProfileState, ProfileView};

pub mod app;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod fake;
pub mod gate;
pub mod models;
pub mod notice;
pub(crate) mod records;
mod remote;
pub mod session;
pub mod task;
pub mod telemetry;
pub mod views;

/// A specific collection of the backend.
///
/// Created with [`BackendClient::collection`]; every REST operation on
/// records of that collection hangs off this struct.
pub(crate) struct Collection<'a> {
    pub(crate) client: &'a BackendClient,
    pub(crate) name: &'a str,
}

impl BackendClient {
    /// Creates a [`Collection`] handle for the given collection name.
    pub(crate) fn collection<'a>(&'a self, collection_name: &'a str) -> Collection<'a> {
        debug_assert!(
            config::is_valid_collection_name(collection_name),
            "invalid collection name: {collection_name}"
        );

        Collection {
            client: self,
            name: collection_name,
        }
    }
}

/// One page of records retrieved from a collection.
///
/// Lists are always requested with `skipTotal`, so only the items matter.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecordList<T> {
    /// A list of all records for the given page.
    pub items: Vec<T>,
}

/// A REST client for a PocketBase-style backend.
///
/// Cloning is cheap and every clone shares the same auth store and session
/// listener. The `Debug` implementation redacts the auth token.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    auth_collection: String,
    reqwest_client: reqwest::Client,
    realtime_timeout: Duration,
    auth_store: RwLock<Option<AuthStore>>,
    session: watch::Sender<Option<Session>>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url)
            .field("auth_collection", &self.inner.auth_collection)
            .field(
                "auth_store",
                &self.inner.auth_store.read().as_ref().map(|_| "***REDACTED***"),
            )
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Builds a client from the backend section of the configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|error| ConfigError::HttpClient(error.to_string()))?;

        Ok(Self::assemble(
            &config.base_url,
            client,
            &config.auth_collection,
            config.realtime_timeout,
        ))
    }

    /// Creates a client around an existing `reqwest` client.
    ///
    /// Accounts authenticate against the `users` collection; use
    /// [`BackendClient::from_config`] to pick another one.
    #[must_use]
    pub fn new_with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self::assemble(
            base_url,
            client,
            config::DEFAULT_ACCOUNTS_COLLECTION,
            config::DEFAULT_REALTIME_TIMEOUT,
        )
    }

    fn assemble(base_url: &str, client: reqwest::Client, auth_collection: &str, realtime_timeout: Duration) -> Self {
        let (session, _) = watch::channel(None);

        Self {
            inner: Arc::new(ClientInner {
                base_url: base_url.trim_end_matches('/').to_string(),
                auth_collection: auth_collection.to_string(),
                reqwest_client: client,
                realtime_timeout,
                auth_store: RwLock::new(None),
                session,
            }),
        }
    }

    /// Retrieves the current auth store, if available.
    #[must_use]
    pub fn auth_store(&self) -> Option<AuthStore> {
        self.inner.auth_store.read().clone()
    }

    /// Retrieves the current authentication token, if available.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner
            .auth_store
            .read()
            .as_ref()
            .map(|auth_store| auth_store.token.clone())
    }

    /// Returns the base URL of the backend.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Name of the collection accounts authenticate against.
    #[must_use]
    pub fn auth_collection(&self) -> &str {
        &self.inner.auth_collection
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.reqwest_client
    }

    pub(crate) fn subscribe_session(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session.subscribe()
    }

    /// Stores the new auth data and publishes the matching session.
    pub(crate) fn update_auth_store(&self, new_auth_store: AuthStore) {
        let session = Session::from(&new_auth_store.record);
        *self.inner.auth_store.write() = Some(new_auth_store);
        self.inner.session.send_replace(Some(session));
    }

    /// Forgets the auth data and publishes "no session".
    pub(crate) fn clear_auth_store(&self) {
        *self.inner.auth_store.write() = None;
        self.inner.session.send_replace(None);
    }
}

impl BackendClient {
    /// Adds the bearer token to the request, if the client is authenticated.
    pub(crate) fn with_authorization_token(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => request_builder.bearer_auth(token),
            None => request_builder,
        }
    }

    /// Creates an authorized `PATCH` request with a JSON body.
    pub(crate) fn request_patch_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> RequestBuilder {
        let request_builder = self.inner.reqwest_client.patch(endpoint).json(params);
        self.with_authorization_token(request_builder)
    }

    /// Creates an authorized `POST` request with a JSON body.
    pub(crate) fn request_post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> RequestBuilder {
        let request_builder = self.inner.reqwest_client.post(endpoint).json(params);
        self.with_authorization_token(request_builder)
    }

    /// Creates an authorized `POST` request with a multipart body.
    pub(crate) fn request_post_form(&self, endpoint: &str, form: Form) -> RequestBuilder {
        let request_builder = self.inner.reqwest_client.post(endpoint).multipart(form);
        self.with_authorization_token(request_builder)
    }

    /// Creates an authorized `PATCH` request with a multipart body.
    pub(crate) fn request_patch_form(&self, endpoint: &str, form: Form) -> RequestBuilder {
        let request_builder = self.inner.reqwest_client.patch(endpoint).multipart(form);
        self.with_authorization_token(request_builder)
    }

    /// Creates an authorized `GET` request expecting JSON, with optional query parameters.
    pub(crate) fn request_get(
        &self,
        endpoint: &str,
        params: Option<Vec<(&str, &str)>>,
    ) -> RequestBuilder {
        let mut request_builder = self
            .inner
            .reqwest_client
            .get(endpoint)
            .header("Accept", "application/json");

        if let Some(params) = params {
            request_builder = request_builder.query(&params);
        }

        self.with_authorization_token(request_builder)
    }

    /// Creates an authorized `GET` request for a server-sent event stream.
    pub(crate) fn request_event_stream(&self, endpoint: &str) -> RequestBuilder {
        let request_builder = self
            .inner
            .reqwest_client
            .get(endpoint)
            .header("Accept", "text/event-stream")
            .timeout(self.inner.realtime_timeout);

        self.with_authorization_token(request_builder)
    }
}
