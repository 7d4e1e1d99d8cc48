//! Application entry point: account flows and the gated shell.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::collaborators::{AuthProvider, BlobStore, DocumentStore, Session, Upload};
use crate::config::{AppConfig, Collections};
use crate::fake::FakeBackend;
use crate::gate::Route;
use crate::models::{to_fields, Account};
use crate::notice::Notice;
use crate::session::{SessionObserver, SessionState, SessionStore};
use crate::views::{CatalogView, HistoryView, IdentifierView, ProfileView, ViewContext};
use crate::BackendClient;

/// The three collaborators the application runs against.
#[derive(Clone)]
pub struct Collaborators {
    /// Authentication service.
    pub auth: Arc<dyn AuthProvider>,
    /// Document database.
    pub documents: Arc<dyn DocumentStore>,
    /// Blob storage.
    pub blobs: Arc<dyn BlobStore>,
}

impl Collaborators {
    /// All three backed by one REST client.
    #[must_use]
    pub fn from_client(client: &BackendClient) -> Self {
        Self {
            auth: Arc::new(client.clone()),
            documents: Arc::new(client.clone()),
            blobs: Arc::new(client.clone()),
        }
    }

    /// All three backed by one in-memory backend.
    #[must_use]
    pub fn from_fake(fake: &FakeBackend) -> Self {
        Self {
            auth: Arc::new(fake.clone()),
            documents: Arc::new(fake.clone()),
            blobs: Arc::new(fake.clone()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Everything the sign-up form collects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignUpForm {
    /// Sign-in email.
    pub email: String,
    /// Password, at least six characters.
    pub password: String,
    /// Display name.
    pub username: String,
    /// Contact number.
    pub phone_number: String,
    /// Identity document photographed during sign-up.
    pub identity_document: Option<Upload>,
}

/// A running client: the session observer plus the account flows.
///
/// Must be started inside a tokio runtime.
#[derive(Debug)]
pub struct App {
    collaborators: Collaborators,
    collections: Collections,
    store: SessionStore,
    _observer: SessionObserver,
}

impl App {
    /// Starts observing the session.
    #[must_use]
    pub fn start(collaborators: Collaborators, config: &AppConfig) -> Self {
        let store = SessionStore::new();
        let observer = SessionObserver::spawn(
            &collaborators.auth,
            Arc::clone(&collaborators.documents),
            config.collections.accounts.clone(),
            config.session,
            store.clone(),
        );

        Self {
            collaborators,
            collections: config.collections.clone(),
            store,
            _observer: observer,
        }
    }

    /// Route the gate currently selects.
    #[must_use]
    pub fn route(&self) -> Route {
        self.store.route()
    }

    /// Current session and approval.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    /// Read side of the session store.
    #[must_use]
    pub const fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Listener on the session and approval; map with [`SessionState::route`].
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// Resolves once the gate selects `route`.
    pub async fn wait_for_route(&self, route: Route) -> SessionState {
        let mut receiver = self.store.subscribe();
        let state = match receiver.wait_for(|state| state.route() == route).await {
            Ok(state) => state.clone(),
            Err(_) => self.store.state(),
        };
        state
    }

    /// Registers an account, stores its profile and leaves it signed out
    /// until the email is verified and an administrator approves it.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn sign_up(&self, form: SignUpForm) -> Result<Notice, Notice> {
        let auth = &self.collaborators.auth;

        let session = auth.create_account(&form.email, &form.password).await.map_err(|error| {
            warn!(%error, "error signing up");
            Notice::sign_up_failed(&error)
        })?;
        info!(uid = %session.uid, "account created");

        let registered = self.register_account(&session, form).await;

        if let Err(error) = auth.sign_out().await {
            warn!(%error, "could not sign out after sign-up");
        }

        registered.map(|()| Notice::sign_up_complete())
    }

    async fn register_account(&self, session: &Session, form: SignUpForm) -> Result<(), Notice> {
        let failed = |detail: &dyn std::fmt::Display| {
            warn!(uid = %session.uid, error = %detail, "error signing up");
            Notice::sign_up_failed(&crate::AuthError::Service(detail.to_string()))
        };

        let document_url = match form.identity_document {
            Some(document) => {
                let path = self.collections.identity_document_path(&session.uid);
                self.collaborators
                    .blobs
                    .upload(&path, document)
                    .await
                    .map_err(|error| failed(&error))?;
                self.collaborators
                    .blobs
                    .download_url(&path)
                    .await
                    .map_err(|error| failed(&error))?
            }
            None => String::new(),
        };

        let account = Account::new(
            &session.uid,
            &session.email,
            &form.username,
            &form.phone_number,
            &document_url,
        );
        let fields = to_fields(&account).map_err(|error| failed(&error))?;
        self.collaborators
            .documents
            .set(&self.collections.accounts, &session.uid, fields)
            .await
            .map_err(|error| failed(&error))?;

        self.collaborators
            .auth
            .send_verification_email(session)
            .await
            .map_err(|error| {
                warn!(uid = %session.uid, %error, "error sending email verification");
                Notice::sign_up_failed(&error)
            })
    }

    /// Signs in. Unverified accounts get a fresh verification email and are
    /// signed straight out again.
    ///
    /// On success, resolves once the gate has left the login screen, or
    /// once the session is gone again because a sign-out overtook it.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), Notice> {
        let auth = &self.collaborators.auth;

        let session = auth.sign_in(email, password).await.map_err(|error| {
            warn!(%error, "error signing in");
            Notice::sign_in_failed(&error)
        })?;

        if !session.email_verified {
            if let Err(error) = auth.send_verification_email(&session).await {
                warn!(uid = %session.uid, %error, "error sending email verification");
            }
            if let Err(error) = auth.sign_out().await {
                warn!(uid = %session.uid, %error, "could not sign out unverified account");
            }
            info!(uid = %session.uid, "sign-in refused until the email is verified");
            return Err(Notice::verification_required());
        }

        let uid = session.uid.as_str();
        let mut settled = self.store.subscribe();
        let mut sessions = auth.watch_session();
        tokio::select! {
            _ = settled.wait_for(|state| state.uid() == Some(uid)) => {}
            _ = sessions.wait_for(|current| current.as_ref().map(|s| s.uid.as_str()) != Some(uid)) => {
                info!(%uid, "session ended before the gate picked it up");
            }
        }
        Ok(())
    }

    /// Signs out; resolves once the gate reads [`Route::Unauthenticated`].
    pub async fn sign_out(&self) -> Result<(), Notice> {
        sign_out_and_settle(self.collaborators.auth.as_ref(), &self.store).await
    }

    /// The main application shell, only while the account is approved.
    #[must_use]
    pub fn shell(&self) -> Option<Shell> {
        let state = self.store.state();
        if state.route() != Route::Approved {
            return None;
        }
        let session = state.session?;

        Some(Shell {
            context: ViewContext {
                uid: session.uid,
                email: session.email,
                auth: Arc::clone(&self.collaborators.auth),
                documents: Arc::clone(&self.collaborators.documents),
                blobs: Arc::clone(&self.collaborators.blobs),
                collections: self.collections.clone(),
                store: self.store.clone(),
            },
        })
    }
}

/// The four views available to an approved account.
///
/// Each call opens a fresh, independent view.
#[derive(Debug, Clone)]
pub struct Shell {
    context: ViewContext,
}

impl Shell {
    /// Account the shell was opened for.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.context.uid
    }

    /// Book catalog.
    #[must_use]
    pub fn catalog(&self) -> CatalogView {
        CatalogView::open(&self.context)
    }

    /// Borrowing history.
    #[must_use]
    pub fn history(&self) -> HistoryView {
        HistoryView::open(&self.context)
    }

    /// Library identifier.
    #[must_use]
    pub fn identifier(&self) -> IdentifierView {
        IdentifierView::open(&self.context)
    }

    /// Profile.
    #[must_use]
    pub fn profile(&self) -> ProfileView {
        ProfileView::open(&self.context)
    }
}

/// Signs out and waits until the observer has cleared the session.
pub(crate) async fn sign_out_and_settle(auth: &dyn AuthProvider, store: &SessionStore) -> Result<(), Notice> {
    auth.sign_out().await.map_err(|error| {
        warn!(%error, "failed to log out");
        Notice::sign_out_failed(&error)
    })?;

    let mut receiver = store.subscribe();
    let _ = receiver.wait_for(|state| state.session.is_none()).await;
    info!("signed out");
    Ok(())
}
