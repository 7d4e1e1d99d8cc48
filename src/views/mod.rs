//! The four views of the main application shell.
//!
//! Views are independent: each one reads what it needs from the
//! collaborators when opened, keeps the result in its own state and writes
//! straight back to the collaborators. Dropping a view cancels its work.

use std::sync::Arc;

use tokio::sync::watch;

use crate::collaborators::{AuthProvider, BlobStore, DocumentStore};
use crate::config::Collections;
use crate::notice::Notice;
use crate::session::SessionStore;

pub mod catalog;
pub mod history;
pub mod identifier;
pub mod profile;

pub use catalog::{CatalogState, CatalogView};
pub use history::HistoryView;
pub use identifier::IdentifierView;
pub use profile::{ProfileState, ProfileView};

/// Data a view is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Loadable<T> {
    /// Not there yet.
    #[default]
    Loading,
    /// Loaded.
    Ready(T),
    /// The collaborator reported a failure.
    Failed(Notice),
}

impl<T> Loadable<T> {
    /// The loaded value, if any.
    #[must_use]
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the view still waits.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// What every view of one signed-in account shares.
#[derive(Clone)]
pub(crate) struct ViewContext {
    pub(crate) uid: String,
    pub(crate) email: String,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) collections: Collections,
    pub(crate) store: SessionStore,
}

impl std::fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewContext")
            .field("uid", &self.uid)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

/// Waits until `receiver` holds a value for which `ready` is true.
///
/// Returns the matching value, or `None` when the view is gone.
pub(crate) async fn wait_for<S: Clone>(
    mut receiver: watch::Receiver<S>,
    ready: impl FnMut(&S) -> bool,
) -> Option<S> {
    receiver.wait_for(ready).await.ok().map(|state| state.clone())
}
