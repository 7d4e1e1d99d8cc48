//! The member's borrowing history.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::{wait_for, Loadable, ViewContext};
use crate::collaborators::{Document, Filter};
use crate::models::{to_fields, BorrowRecord, SAMPLE_BOOK_TITLE, SAMPLE_LOAN_DAYS};
use crate::notice::Notice;
use crate::task::ViewScope;

/// Live list of the signed-in member's borrow records.
#[derive(Debug)]
pub struct HistoryView {
    context: ViewContext,
    state: watch::Sender<Loadable<Vec<BorrowRecord>>>,
    _scope: ViewScope,
}

impl HistoryView {
    pub(crate) fn open(context: &ViewContext) -> Self {
        let (state, _) = watch::channel(Loadable::Loading);
        let scope = ViewScope::new();

        let records_state = state.clone();
        let documents = context.documents.clone();
        let collection = context.collections.borrow_records.clone();
        let uid = context.uid.clone();
        scope.spawn(async move {
            let filter = Filter::eq("userId", uid.as_str());
            let mut subscription = match documents.subscribe(&collection, filter).await {
                Ok(subscription) => subscription,
                Err(error) => {
                    warn!(%uid, %error, "could not subscribe to borrow history");
                    records_state.send_replace(Loadable::Failed(Notice::from_backend(
                        "load your history",
                        &error,
                    )));
                    return;
                }
            };

            while let Some(snapshot) = subscription.next().await {
                records_state.send_replace(match snapshot {
                    Ok(documents) => Loadable::Ready(decode_records(&documents)),
                    Err(error) => {
                        warn!(%uid, %error, "error fetching borrow history");
                        Loadable::Failed(Notice::from_backend("load your history", &error))
                    }
                });
            }
        });

        Self {
            context: context.clone(),
            state,
            _scope: scope,
        }
    }

    /// Current records.
    #[must_use]
    pub fn state(&self) -> Loadable<Vec<BorrowRecord>> {
        self.state.borrow().clone()
    }

    /// Listener on the records.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Loadable<Vec<BorrowRecord>>> {
        self.state.subscribe()
    }

    /// Waits until the list holds at least `count` records (or failed).
    pub async fn wait_for_records(&self, count: usize) -> Loadable<Vec<BorrowRecord>> {
        let reached = move |state: &Loadable<Vec<BorrowRecord>>| match state {
            Loadable::Loading => false,
            Loadable::Ready(records) => records.len() >= count,
            Loadable::Failed(_) => true,
        };
        wait_for(self.watch(), reached)
            .await
            .unwrap_or_else(|| self.state())
    }

    /// Stores a new, open loan for the signed-in member. Returns its key.
    #[instrument(skip(self), fields(uid = %self.context.uid))]
    pub async fn record_borrow(
        &self,
        book_title: &str,
        borrowed_at: DateTime<Utc>,
        loan_days: i64,
    ) -> Result<String, Notice> {
        let fields = BorrowRecord::open(&self.context.uid, book_title, borrowed_at, loan_days)
            .and_then(|record| to_fields(&record))
            .map_err(|error| {
                warn!(%error, "refusing borrow record");
                Notice::from_backend("record the loan", &error)
            })?;

        match self
            .context
            .documents
            .add(&self.context.collections.borrow_records, fields)
            .await
        {
            Ok(key) => {
                info!(%key, "borrow record added");
                Ok(key)
            }
            Err(error) => {
                warn!(%error, "error adding borrow record");
                Err(Notice::from_backend("record the loan", &error))
            }
        }
    }

    /// Adds the sample loan used to try the history out.
    pub async fn add_sample_record(&self) -> Result<String, Notice> {
        self.record_borrow(SAMPLE_BOOK_TITLE, Utc::now(), SAMPLE_LOAN_DAYS)
            .await
    }
}

fn decode_records(documents: &[Document]) -> Vec<BorrowRecord> {
    documents
        .iter()
        .filter_map(|document| match document.decode::<BorrowRecord>() {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(id = %document.id, %error, "skipping malformed borrow record");
                None
            }
        })
        .collect()
}
