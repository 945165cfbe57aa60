//! Item service: the composition root tying the store, the query pipeline,
//! and the index synchronizer together for the item entity.
//!
//! The consistency contract: the store is mutated first, and the index is
//! touched only after that mutation committed. An index failure after a
//! committed write is carried in the returned outcome, never as an error,
//! because the item's durability must not depend on index availability.

use tracing::{info, instrument};

use crate::config::DataPaths;
use crate::error::{Error, Result};
use crate::model::types::{Comment, Document, Item, ItemPatch, NewComment, NewItem};
use crate::query::augment::{OWNER_KEY, scope_to_created_range, scope_to_owner};
use crate::query::builder::{QueryBuilder, SelectQuery};
use crate::query::raw::RawQuery;
use crate::search::sync::{IndexSynchronizer, SyncOutcome};
use crate::search::tantivy::TantivyIndexClient;
use crate::storage::sqlite::{ITEMS_COLLECTION, SqliteStorage};

/// Index name items are mirrored under.
pub const ITEM_INDEX: &str = "items";

/// Fields the free-text `searchTerm` scope matches against.
pub const ITEM_SEARCH_FIELDS: &[&str] = &["title", "description"];

/// A successful create/update, with the secondary index outcome attached.
#[derive(Debug)]
pub struct MutationOutcome {
    pub item: Item,
    pub index: SyncOutcome,
}

/// A successful delete, with the secondary index outcome attached.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub item: Item,
    pub index: SyncOutcome,
}

pub struct ItemService {
    store: SqliteStorage,
    sync: IndexSynchronizer,
    index_name: String,
}

impl ItemService {
    pub fn new(store: SqliteStorage, sync: IndexSynchronizer) -> Self {
        Self {
            store,
            sync,
            index_name: ITEM_INDEX.to_string(),
        }
    }

    /// Open the default composition: SQLite store plus Tantivy index under
    /// the resolved data paths.
    pub fn open(paths: &DataPaths) -> Result<Self> {
        let store = SqliteStorage::open(&paths.db_path)?;
        let client = TantivyIndexClient::open(&paths.index_dir);
        Ok(Self::new(store, IndexSynchronizer::new(Box::new(client))))
    }

    #[instrument(skip_all, fields(owner = %new.owner))]
    pub fn create(&mut self, new: NewItem) -> Result<MutationOutcome> {
        validate_new_item(&new)?;
        let item = self.store.create_item(&new)?;
        let index = self.upsert_index(&item);
        info!(item_id = item.id, indexed = index.is_applied(), "item created");
        Ok(MutationOutcome { item, index })
    }

    pub fn get(&self, id: i64) -> Result<Item> {
        self.store.get_item(id)?.ok_or(Error::NotFound(id))
    }

    /// List items for an arbitrary boundary query: ownership and date-range
    /// augmenters first, then the builder stages in conventional order.
    /// An empty result set is a success with zero documents.
    pub fn list(&self, query: RawQuery) -> Result<Vec<Document>> {
        let query = scope_to_owner(query);
        let query = scope_to_created_range(query);
        let select = QueryBuilder::new(SelectQuery::over(ITEMS_COLLECTION), query)
            .search(ITEM_SEARCH_FIELDS)
            .filter()
            .sort()
            .paginate()
            .fields()
            .build();
        self.store.find(&select)
    }

    /// List one owner's items, honoring any other filters in the query.
    pub fn list_for_owner(&self, owner: &str, mut query: RawQuery) -> Result<Vec<Document>> {
        query.insert(OWNER_KEY, owner);
        self.list(query)
    }

    #[instrument(skip_all, fields(item_id = id))]
    pub fn update(&mut self, id: i64, patch: ItemPatch) -> Result<MutationOutcome> {
        let item = self
            .store
            .update_item(id, &patch)?
            .ok_or(Error::NotFound(id))?;
        let index = self.upsert_index(&item);
        info!(indexed = index.is_applied(), "item updated");
        Ok(MutationOutcome { item, index })
    }

    /// Delete from the store, then remove from the index. A missing item is
    /// reported before any index call; removing a never-indexed id yields
    /// `Skipped`, not a failure.
    #[instrument(skip_all, fields(item_id = id))]
    pub fn delete(&mut self, id: i64) -> Result<DeleteOutcome> {
        let item = self.store.delete_item(id)?.ok_or(Error::NotFound(id))?;
        let index = self.sync.remove(&self.index_name, &id.to_string());
        info!(deindexed = index.is_applied(), "item deleted");
        Ok(DeleteOutcome { item, index })
    }

    /// Comments are stored with the item but not mirrored to the index.
    pub fn add_comment(&mut self, item_id: i64, new: NewComment) -> Result<Comment> {
        if new.body.trim().is_empty() {
            return Err(Error::Validation("comment body is required".into()));
        }
        self.store
            .add_comment(item_id, &new)?
            .ok_or(Error::NotFound(item_id))
    }

    fn upsert_index(&self, item: &Item) -> SyncOutcome {
        match item.indexable() {
            Some(doc) => self.sync.upsert(&doc, &self.index_name),
            None => SyncOutcome::Skipped,
        }
    }
}

fn validate_new_item(new: &NewItem) -> Result<()> {
    if new.title.trim().is_empty() {
        return Err(Error::Validation("title is required".into()));
    }
    if new.owner.trim().is_empty() {
        return Err(Error::Validation("owner is required".into()));
    }
    Ok(())
}
