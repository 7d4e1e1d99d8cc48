//! Top-level route selection.

use crate::collaborators::Session;
use crate::session::Approval;

/// The three top-level views of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// No session: login and sign-up.
    Unauthenticated,
    /// Signed in, approval not granted (yet). The only action is sign-out.
    Pending,
    /// Signed in and approved: the main application shell.
    Approved,
}

impl Route {
    /// Picks the route for a session and the approval observed for it.
    ///
    /// Only an explicit [`Approval::Granted`] opens the shell; an unknown or
    /// denied approval keeps a signed-in account on [`Route::Pending`].
    #[must_use]
    pub const fn select(session: Option<&Session>, approval: Approval) -> Self {
        match (session, approval) {
            (None, _) => Self::Unauthenticated,
            (Some(_), Approval::Granted) => Self::Approved,
            (Some(_), Approval::Unresolved | Approval::Denied) => Self::Pending,
        }
    }
}
