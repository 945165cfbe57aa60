//! Item catalog with filtered SQLite queries and a synchronized Tantivy
//! full-text index.
//!
//! Boundary query parameters flow through pure augmenters
//! ([`query::augment`]) and the staged builder ([`query::builder`]) into a
//! lazy [`query::builder::SelectQuery`], which only the store executes.
//! Every committed mutation is mirrored into the search index by
//! [`search::sync::IndexSynchronizer`]; the store is the source of truth
//! and the index is a best-effort projection whose failures are surfaced
//! alongside the successful write, never instead of it.

pub mod config;
pub mod error;
pub mod items;
pub mod model;
pub mod query;
pub mod search;
pub mod storage;

pub use config::DataPaths;
pub use error::{Error, Result};
pub use items::{DeleteOutcome, ItemService, MutationOutcome};
pub use model::types::{IndexableDocument, Item, ItemPatch, NewComment, NewItem};
pub use query::raw::RawQuery;
pub use search::sync::{IndexSyncError, IndexSynchronizer, SearchIndexClient, SyncOutcome};
