//! Item entity structs.

use serde::{Deserialize, Serialize};

/// A projected query result: whatever field subset the caller asked for.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A persisted catalog item. `id` is `None` until the store assigns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    /// Opaque owner identifier. The store does not validate its format;
    /// a nonsense owner simply never matches an ownership-scoped query.
    pub owner: String,
    pub images: Vec<String>,
    pub comments: Vec<Comment>,
    /// Epoch milliseconds, UTC.
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    /// The search-index projection of this item, or `None` for an item that
    /// has not been persisted yet.
    pub fn indexable(&self) -> Option<IndexableDocument> {
        self.id.map(|id| IndexableDocument {
            id: id.to_string(),
            title: self.title.clone(),
            body: self.description.clone().unwrap_or_default(),
            owner: self.owner.clone(),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<i64>,
    pub author: String,
    pub body: String,
    pub created_at: i64,
}

/// Payload for creating an item. Comments supplied here are inserted in the
/// same transaction as the item row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub owner: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub comments: Vec<NewComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub author: String,
    pub body: String,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
}

/// The subset of an item mirrored into the search index: the identifier plus
/// the fields used for ranking and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexableDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub owner: String,
    pub created_at: i64,
}
