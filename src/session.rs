//! Session and approval state, and the observer that keeps it current.
//!
//! The [`SessionStore`] holds the `(session, approval)` pair every part of the
//! UI reads. Exactly one writer exists: the [`SessionObserver`], which follows
//! the auth collaborator's session listener and, for each signed-in account,
//! looks up and then watches the account document's approval flag.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::{AuthProvider, Document, DocumentStore, Filter, Session};
use crate::config::SessionConfig;
use crate::gate::Route;
use crate::task::AbortOnDrop;

/// Field of the account document an administrator flips to approve it.
pub const APPROVAL_FIELD: &str = "isAdminApproved";

/// Approval status of the signed-in account, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Approval {
    /// Not known (yet): no successful lookup, or the account has no document.
    #[default]
    Unresolved,
    /// The account document says the account is not approved.
    Denied,
    /// The account document explicitly says the account is approved.
    Granted,
}

impl Approval {
    /// Reads the approval flag off an account document.
    ///
    /// Anything other than a literal `true` is treated as not approved.
    #[must_use]
    pub fn from_account(document: Option<&Document>) -> Self {
        match document {
            None => Self::Unresolved,
            Some(document) => match document.get(APPROVAL_FIELD) {
                Some(Value::Bool(true)) => Self::Granted,
                _ => Self::Denied,
            },
        }
    }

    /// Whether the account may enter the main application.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// The pair the gate decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Current verified session, if any.
    pub session: Option<Session>,
    /// Approval observed for that session.
    pub approval: Approval,
}

impl SessionState {
    /// Route this state selects.
    #[must_use]
    pub fn route(&self) -> Route {
        Route::select(self.session.as_ref(), self.approval)
    }

    /// Account id of the session, if any.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.uid.as_str())
    }
}

/// Observable `(session, approval)` store.
///
/// Cloning hands out another view of the same store. Reads are public;
/// writes are reserved to the observer.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionState>>,
}

impl SessionStore {
    /// A store with no session.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SessionState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current pair.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    /// Current route.
    #[must_use]
    pub fn route(&self) -> Route {
        self.sender.borrow().route()
    }

    /// Listener notified on every change of the pair.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    /// Starts a new session with an unresolved approval.
    pub(crate) fn begin(&self, session: Session) {
        self.sender.send_replace(SessionState {
            session: Some(session),
            approval: Approval::Unresolved,
        });
    }

    /// Replaces the session snapshot of the same account, keeping the approval.
    pub(crate) fn refresh(&self, session: Session) {
        self.sender.send_if_modified(|state| match &state.session {
            Some(current) if current.uid == session.uid && *current != session => {
                state.session = Some(session);
                true
            }
            _ => false,
        });
    }

    /// Records the approval observed for `uid`.
    ///
    /// Ignored (returns `false`) unless `uid` is still the current session.
    pub(crate) fn set_approval(&self, uid: &str, approval: Approval) -> bool {
        let mut applied = false;
        self.sender.send_if_modified(|state| {
            if state.uid() != Some(uid) {
                return false;
            }
            applied = true;
            if state.approval == approval {
                return false;
            }
            state.approval = approval;
            true
        });
        applied
    }

    /// Drops the session and its approval.
    pub(crate) fn clear(&self) {
        self.sender.send_if_modified(|state| {
            if *state == SessionState::default() {
                return false;
            }
            *state = SessionState::default();
            true
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The single writer of a [`SessionStore`].
///
/// Runs until dropped.
#[derive(Debug)]
pub struct SessionObserver {
    worker: JoinHandle<()>,
}

impl SessionObserver {
    /// Starts observing `auth` and writing into `store`.
    ///
    /// Account documents are read from `accounts`.
    pub fn spawn(
        auth: &Arc<dyn AuthProvider>,
        documents: Arc<dyn DocumentStore>,
        accounts: String,
        config: SessionConfig,
        store: SessionStore,
    ) -> Self {
        let sessions = auth.watch_session();
        let worker = tokio::spawn(observe(sessions, documents, accounts, config, store));
        Self { worker }
    }
}

impl Drop for SessionObserver {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn observe(
    mut sessions: watch::Receiver<Option<Session>>,
    documents: Arc<dyn DocumentStore>,
    accounts: String,
    config: SessionConfig,
    store: SessionStore,
) {
    let mut approval_task: Option<AbortOnDrop> = None;

    loop {
        // Unverified sessions never reach the gate.
        let session = sessions
            .borrow_and_update()
            .clone()
            .filter(|session| session.email_verified);

        match session {
            None => {
                if approval_task.take().is_some() {
                    info!("session ended");
                }
                store.clear();
            }
            Some(session)
                if approval_task.is_some() && store.state().uid() == Some(session.uid.as_str()) =>
            {
                store.refresh(session);
            }
            Some(session) => {
                info!(uid = %session.uid, "session started");
                let uid = session.uid.clone();
                // Dropping the previous task first keeps its late answers out of the new session.
                drop(approval_task.take());
                store.begin(session);
                approval_task = Some(AbortOnDrop(tokio::spawn(watch_approval(
                    Arc::clone(&documents),
                    accounts.clone(),
                    uid,
                    config,
                    store.clone(),
                ))));
            }
        }

        if sessions.changed().await.is_err() {
            debug!("session listener closed");
            return;
        }
    }
}

/// Resolves and then follows the approval flag of one account.
///
/// A failed lookup leaves the approval untouched and is retried with a
/// doubling delay. Once resolved, the account document is watched so an
/// administrator's decision reaches the gate without a new sign-in.
async fn watch_approval(
    documents: Arc<dyn DocumentStore>,
    accounts: String,
    uid: String,
    config: SessionConfig,
    store: SessionStore,
) {
    let mut backoff = Backoff::new(config);

    loop {
        match documents.get_one(&accounts, &uid).await {
            Ok(account) => {
                let approval = Approval::from_account(account.as_ref());
                debug!(%uid, ?approval, "account resolved");
                if !store.set_approval(&uid, approval) {
                    return;
                }
                backoff.reset();
            }
            Err(error) => {
                warn!(%uid, %error, "account lookup failed, retrying");
                tokio::time::sleep(backoff.next_delay()).await;
                continue;
            }
        }

        match documents.subscribe(&accounts, Filter::by_id(uid.as_str())).await {
            Ok(mut subscription) => {
                while let Some(snapshot) = subscription.next().await {
                    match snapshot {
                        Ok(found) => {
                            let approval = Approval::from_account(found.first());
                            if !store.set_approval(&uid, approval) {
                                return;
                            }
                        }
                        Err(error) => warn!(%uid, %error, "account subscription error"),
                    }
                }
                debug!(%uid, "account subscription closed");
            }
            Err(error) => warn!(%uid, %error, "account subscription failed"),
        }

        tokio::time::sleep(backoff.next_delay()).await;
    }
}

/// Capped doubling delay.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    const fn new(config: SessionConfig) -> Self {
        Self {
            initial: config.lookup_retry_initial,
            max: config.lookup_retry_max,
            current: config.lookup_retry_initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
