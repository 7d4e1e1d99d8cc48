//! Book catalog with the account's greeting.

use tokio::sync::watch;
use tracing::{debug, warn};

use super::{wait_for, Loadable, ViewContext};
use crate::collaborators::{Document, Filter};
use crate::models::Book;
use crate::notice::Notice;
use crate::task::ViewScope;

/// Name greeted when the account has none.
pub const FALLBACK_NAME: &str = "User";

/// What the catalog shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogState {
    /// Name of the signed-in member, once known.
    pub user_name: Option<String>,
    /// All books, live.
    pub books: Loadable<Vec<Book>>,
}

impl CatalogState {
    /// Header line, e.g. `Welcome Back, Ana`.
    #[must_use]
    pub fn greeting(&self) -> String {
        format!("Welcome Back, {}", self.user_name.as_deref().unwrap_or(FALLBACK_NAME))
    }
}

/// Live view of the catalog.
#[derive(Debug)]
pub struct CatalogView {
    state: watch::Sender<CatalogState>,
    _scope: ViewScope,
}

impl CatalogView {
    pub(crate) fn open(context: &ViewContext) -> Self {
        let (state, _) = watch::channel(CatalogState::default());
        let scope = ViewScope::new();

        let greeting_state = state.clone();
        let documents = context.documents.clone();
        let accounts = context.collections.accounts.clone();
        let uid = context.uid.clone();
        scope.spawn(async move {
            let name = match documents.get_one(&accounts, &uid).await {
                Ok(account) => display_name(account.as_ref()),
                Err(error) => {
                    warn!(%uid, %error, "could not load the member name");
                    FALLBACK_NAME.to_owned()
                }
            };
            greeting_state.send_modify(|state| state.user_name = Some(name));
        });

        let books_state = state.clone();
        let documents = context.documents.clone();
        let books = context.collections.books.clone();
        scope.spawn(async move {
            let mut subscription = match documents.subscribe(&books, Filter::all()).await {
                Ok(subscription) => subscription,
                Err(error) => {
                    warn!(%error, "could not subscribe to books");
                    books_state.send_modify(|state| {
                        state.books = Loadable::Failed(Notice::from_backend("load books", &error));
                    });
                    return;
                }
            };

            while let Some(snapshot) = subscription.next().await {
                let books = match snapshot {
                    Ok(documents) => {
                        debug!(count = documents.len(), "books updated");
                        Loadable::Ready(decode_books(&documents))
                    }
                    Err(error) => {
                        warn!(%error, "error fetching books");
                        Loadable::Failed(Notice::from_backend("load books", &error))
                    }
                };
                books_state.send_modify(|state| state.books = books);
            }
        });

        Self {
            state,
            _scope: scope,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CatalogState {
        self.state.borrow().clone()
    }

    /// Listener on the state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<CatalogState> {
        self.state.subscribe()
    }

    /// Waits until both the greeting and the books are resolved.
    pub async fn loaded(&self) -> CatalogState {
        let settled = |state: &CatalogState| state.user_name.is_some() && !state.books.is_loading();
        wait_for(self.watch(), settled)
            .await
            .unwrap_or_else(|| self.state())
    }

    /// A loaded book, for the detail display.
    #[must_use]
    pub fn book(&self, id: &str) -> Option<Book> {
        self.state
            .borrow()
            .books
            .ready()
            .and_then(|books| books.iter().find(|book| book.id == id).cloned())
    }
}

fn display_name(account: Option<&Document>) -> String {
    account
        .and_then(|account| account.get("username"))
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_owned()
}

fn decode_books(documents: &[Document]) -> Vec<Book> {
    documents
        .iter()
        .filter_map(|document| match document.decode::<Book>() {
            Ok(book) => Some(book),
            Err(error) => {
                warn!(id = %document.id, %error, "skipping malformed book");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn account(value: serde_json::Value) -> Document {
        let serde_json::Value::Object(fields) = value else {
            panic!("fixture must be an object");
        };
        Document::new("u1", fields)
    }

    #[test]
    fn empty_or_missing_names_fall_back() {
        assert_eq!(display_name(None), "User");
        assert_eq!(display_name(Some(&account(json!({"username": ""})))), "User");
        assert_eq!(display_name(Some(&account(json!({"username": "Ana"})))), "Ana");
    }

    #[test]
    fn greeting_uses_the_fallback_until_loaded() {
        let mut state = CatalogState::default();
        assert_eq!(state.greeting(), "Welcome Back, User");
        state.user_name = Some("Ana".to_owned());
        assert_eq!(state.greeting(), "Welcome Back, Ana");
    }

    #[test]
    fn malformed_books_are_skipped() {
        let good = account(json!({"title": "Dune", "available": true}));
        let bad = account(json!({"title": 42}));

        let books = decode_books(&[good, bad]);
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
    }
}
