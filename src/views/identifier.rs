//! The member's library identifier, shown as a QR code.

use tokio::sync::watch;
use tracing::warn;

use super::{wait_for, ViewContext};
use crate::task::ViewScope;

/// One-shot view of the account's barcode.
///
/// Holds `None` while loading and an empty string when the account has
/// no barcode or could not be read.
#[derive(Debug)]
pub struct IdentifierView {
    state: watch::Sender<Option<String>>,
    _scope: ViewScope,
}

impl IdentifierView {
    pub(crate) fn open(context: &ViewContext) -> Self {
        let (state, _) = watch::channel(None);
        let scope = ViewScope::new();

        let barcode_state = state.clone();
        let documents = context.documents.clone();
        let accounts = context.collections.accounts.clone();
        let uid = context.uid.clone();
        scope.spawn(async move {
            let barcode = match documents.get_one(&accounts, &uid).await {
                Ok(account) => account
                    .as_ref()
                    .and_then(|account| account.get("barcode"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                Err(error) => {
                    warn!(%uid, %error, "could not load the barcode");
                    String::new()
                }
            };
            barcode_state.send_replace(Some(barcode));
        });

        Self {
            state,
            _scope: scope,
        }
    }

    /// The barcode, once loaded.
    #[must_use]
    pub fn barcode(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    /// Waits for the barcode.
    pub async fn loaded(&self) -> String {
        wait_for(self.state.subscribe(), Option::is_some)
            .await
            .flatten()
            .unwrap_or_default()
    }
}
