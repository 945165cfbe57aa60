//! Index synchronizer: best-effort dual-write from the store to the index.
//!
//! Both operations run strictly after the corresponding store mutation has
//! committed. A failure here never rolls the store back; it is folded into
//! the returned [`SyncOutcome`] so callers can retry, log, or ignore while
//! still treating the write itself as successful.

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::types::IndexableDocument;

/// A search-index backend. Implementations must make `upsert` idempotent:
/// repeated upserts of one identifier converge to a single entry holding the
/// latest field values.
pub trait SearchIndexClient: Send + Sync {
    fn upsert(&self, index: &str, doc: &IndexableDocument) -> anyhow::Result<()>;

    /// Remove a document by identifier. `Ok(false)` means the identifier was
    /// never indexed, which is not an error.
    fn delete(&self, index: &str, doc_id: &str) -> anyhow::Result<bool>;
}

/// Clients are often shared between a synchronizer and a read path; the
/// writer lock lives inside the client, so sharing goes through `Arc`.
impl<T: SearchIndexClient + ?Sized> SearchIndexClient for std::sync::Arc<T> {
    fn upsert(&self, index: &str, doc: &IndexableDocument) -> anyhow::Result<()> {
        (**self).upsert(index, doc)
    }

    fn delete(&self, index: &str, doc_id: &str) -> anyhow::Result<bool> {
        (**self).delete(index, doc_id)
    }
}

/// An index mutation that failed after the store mutation committed.
#[derive(Debug, Error)]
#[error("index sync failed for {index}/{doc_id}: {source}")]
pub struct IndexSyncError {
    pub index: String,
    pub doc_id: String,
    #[source]
    pub source: anyhow::Error,
}

/// Result of one index-mutation attempt.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The index now reflects the store.
    Applied,
    /// Nothing to do (remove of a never-indexed id, or an unpersisted doc).
    Skipped,
    /// The index may be stale; the store mutation stands.
    Failed(IndexSyncError),
}

impl SyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn failure(&self) -> Option<&IndexSyncError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Mirrors persisted documents into a named search index through whatever
/// client it was constructed with.
pub struct IndexSynchronizer {
    client: Box<dyn SearchIndexClient>,
}

impl IndexSynchronizer {
    pub fn new(client: Box<dyn SearchIndexClient>) -> Self {
        Self { client }
    }

    pub fn upsert(&self, doc: &IndexableDocument, index: &str) -> SyncOutcome {
        match self.client.upsert(index, doc) {
            Ok(()) => {
                debug!(index, doc_id = %doc.id, "index upsert applied");
                SyncOutcome::Applied
            }
            Err(source) => {
                warn!(index, doc_id = %doc.id, error = %source, "index upsert failed");
                SyncOutcome::Failed(IndexSyncError {
                    index: index.to_string(),
                    doc_id: doc.id.clone(),
                    source,
                })
            }
        }
    }

    pub fn remove(&self, index: &str, doc_id: &str) -> SyncOutcome {
        match self.client.delete(index, doc_id) {
            Ok(true) => {
                debug!(index, doc_id, "index document removed");
                SyncOutcome::Applied
            }
            Ok(false) => {
                debug!(index, doc_id, "index document was never indexed");
                SyncOutcome::Skipped
            }
            Err(source) => {
                warn!(index, doc_id, error = %source, "index remove failed");
                SyncOutcome::Failed(IndexSyncError {
                    index: index.to_string(),
                    doc_id: doc_id.to_string(),
                    source,
                })
            }
        }
    }
}
