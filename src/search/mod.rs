//! Search-index layer: the pluggable client seam, the synchronizer that
//! mirrors store mutations into the index, and the Tantivy-backed client.

pub mod sync;
pub mod tantivy;
