//! `SQLite` backend: schema, migrations, CRUD, and the query compiler.
//!
//! [`find`](SqliteStorage::find) compiles a [`SelectQuery`] by wrapping each
//! recorded operation around the previous one as a subquery, so the
//! operations apply in exactly the order the builder recorded them. Rows are
//! decoded into JSON documents, which lets projections shape the result
//! without a struct per field subset.

use std::path::Path;

use chrono::Utc;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::types::{Comment, Document, Item, ItemPatch, NewComment, NewItem};
use crate::query::builder::{ProjectionSpec, QueryOp, SelectQuery, SortDirection};
use crate::query::raw::{FilterOp, FilterPredicate, FilterValue};

pub const ITEMS_COLLECTION: &str = "items";

/// Columns of the items collection. Exclusion projections are resolved
/// against this list.
pub const ITEM_COLUMNS: &[&str] = &[
    "id",
    "title",
    "description",
    "owner",
    "images",
    "created_at",
    "updated_at",
];

/// Columns holding JSON-encoded values, decoded when rows become documents.
const JSON_COLUMNS: &[&str] = &["images"];

const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    owner TEXT NOT NULL,
    images TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    author TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_owner_created
    ON items(owner, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_comments_item
    ON comments(item_id, created_at);
";

/// The primary document store. Source of truth; the search index is a
/// derived projection repaired by re-indexing, never read back into here.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.init()?;
        info!(path = %path.display(), "opened item store");
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self> {
        let storage = Self {
            conn: Connection::open_in_memory()?,
        };
        storage.init()?;
        Ok(storage)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", true)?;
        self.conn.execute_batch(MIGRATION_V1)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        let found = self.schema_version()?;
        if found > SCHEMA_VERSION {
            return Err(Error::Schema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        let raw: String = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        raw.parse().map_err(|_| Error::Schema {
            found: -1,
            supported: SCHEMA_VERSION,
        })
    }

    /// Direct connection access for maintenance and tests.
    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    pub fn create_item(&mut self, new: &NewItem) -> Result<Item> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO items (title, description, owner, images, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                new.title,
                new.description,
                new.owner,
                encode_string_list(&new.images),
                now,
                now
            ],
        )?;
        let item_id = tx.last_insert_rowid();
        let mut comments = Vec::with_capacity(new.comments.len());
        for comment in &new.comments {
            comments.push(insert_comment(&tx, item_id, comment, now)?);
        }
        tx.commit()?;
        debug!(item_id, owner = %new.owner, "item created");
        Ok(Item {
            id: Some(item_id),
            title: new.title.clone(),
            description: new.description.clone(),
            owner: new.owner.clone(),
            images: new.images.clone(),
            comments,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, title, description, owner, images, created_at, updated_at
                 FROM items WHERE id = ?",
                params![id],
                item_from_row,
            )
            .optional()?;
        match item {
            Some(mut item) => {
                item.comments = self.fetch_comments(id)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn fetch_comments(&self, item_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author, body, created_at FROM comments
             WHERE item_id = ? ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![item_id], |row| {
            Ok(Comment {
                id: Some(row.get(0)?),
                author: row.get(1)?,
                body: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Apply a partial update. Returns `None` when the id does not exist.
    pub fn update_item(&mut self, id: i64, patch: &ItemPatch) -> Result<Option<Item>> {
        let now = Utc::now().timestamp_millis();
        let mut sets: Vec<&str> = vec!["updated_at = ?"];
        let mut values: Vec<Value> = vec![Value::Integer(now)];
        if let Some(title) = &patch.title {
            sets.push("title = ?");
            values.push(Value::Text(title.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            values.push(Value::Text(description.clone()));
        }
        if let Some(images) = &patch.images {
            sets.push("images = ?");
            values.push(match encode_string_list(images) {
                Some(encoded) => Value::Text(encoded),
                None => Value::Null,
            });
        }
        values.push(Value::Integer(id));

        let changed = self.conn.execute(
            &format!("UPDATE items SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values),
        )?;
        if changed == 0 {
            return Ok(None);
        }
        debug!(item_id = id, "item updated");
        self.get_item(id)
    }

    /// Delete an item and its comments. Returns the deleted item so the
    /// caller can de-index it, or `None` when the id does not exist.
    pub fn delete_item(&mut self, id: i64) -> Result<Option<Item>> {
        let Some(item) = self.get_item(id)? else {
            return Ok(None);
        };
        self.conn
            .execute("DELETE FROM items WHERE id = ?", params![id])?;
        debug!(item_id = id, "item deleted");
        Ok(Some(item))
    }

    /// Attach a comment. Returns `None` when the item does not exist.
    pub fn add_comment(&mut self, item_id: i64, new: &NewComment) -> Result<Option<Comment>> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE id = ?)",
            params![item_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }
        let now = Utc::now().timestamp_millis();
        let comment = insert_comment(&self.conn, item_id, new, now)?;
        Ok(Some(comment))
    }

    /// Execute a composed query and decode each row into a JSON document.
    ///
    /// Field names the schema does not know fail at prepare time and surface
    /// as [`Error::Store`]; the builder deliberately forwards them unchecked.
    pub fn find(&self, query: &SelectQuery) -> Result<Vec<Document>> {
        let (sql, values) = compile_select(query);
        debug!(collection = query.collection(), sql = %sql, "executing select");
        let mut stmt = self.conn.prepare(&sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| (*name).to_string())
            .collect();
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let mut doc = Document::new();
            for (idx, name) in column_names.iter().enumerate() {
                doc.insert(name.clone(), column_to_json(row, idx, name)?);
            }
            documents.push(doc);
        }
        Ok(documents)
    }
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: Some(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        owner: row.get(3)?,
        images: decode_string_list(row.get(4)?),
        comments: Vec::new(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn insert_comment(
    conn: &Connection,
    item_id: i64,
    new: &NewComment,
    now: i64,
) -> Result<Comment> {
    conn.execute(
        "INSERT INTO comments (item_id, author, body, created_at) VALUES (?, ?, ?, ?)",
        params![item_id, new.author, new.body, now],
    )?;
    Ok(Comment {
        id: Some(conn.last_insert_rowid()),
        author: new.author.clone(),
        body: new.body.clone(),
        created_at: now,
    })
}

/// `None` for empty lists so the column stays NULL instead of `[]`.
fn encode_string_list(values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    serde_json::to_string(values).ok()
}

fn decode_string_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|encoded| serde_json::from_str(&encoded).ok())
        .unwrap_or_default()
}

fn column_to_json(row: &rusqlite::Row<'_>, idx: usize, name: &str) -> Result<serde_json::Value> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(n) => serde_json::Value::from(n),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if JSON_COLUMNS.contains(&name) {
                match serde_json::from_str(&text) {
                    Ok(decoded) => decoded,
                    Err(_) => serde_json::Value::String(text),
                }
            } else {
                serde_json::Value::String(text)
            }
        }
        ValueRef::Blob(_) => serde_json::Value::Null,
    };
    Ok(value)
}

/// Compile the op list into SQL, one subquery layer per operation.
fn compile_select(query: &SelectQuery) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT * FROM {}", quote_ident(query.collection()));
    let mut values: Vec<Value> = Vec::new();

    for op in query.ops() {
        sql = match op {
            QueryOp::Search { term, fields } if !fields.is_empty() => {
                let pattern = format!("%{}%", like_escape(term));
                let clause = fields
                    .iter()
                    .map(|field| {
                        values.push(Value::Text(pattern.clone()));
                        format!("{} LIKE ? ESCAPE '\\'", quote_ident(field))
                    })
                    .collect::<Vec<_>>()
                    .join(" OR ");
                format!("SELECT * FROM ({sql}) WHERE ({clause})")
            }
            QueryOp::Search { .. } => sql,
            QueryOp::Filter(predicates) if !predicates.is_empty() => {
                let clause = predicates
                    .iter()
                    .map(|predicate| predicate_clause(predicate, &mut values))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!("SELECT * FROM ({sql}) WHERE {clause}")
            }
            QueryOp::Filter(_) => sql,
            QueryOp::Sort(spec) if !spec.is_empty() => {
                let clause = spec
                    .0
                    .iter()
                    .map(|(field, direction)| {
                        let direction = match direction {
                            SortDirection::Asc => "ASC",
                            SortDirection::Desc => "DESC",
                        };
                        format!("{} {direction}", quote_ident(field))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("SELECT * FROM ({sql}) ORDER BY {clause}")
            }
            QueryOp::Sort(_) => sql,
            QueryOp::Paginate(page) => {
                values.push(Value::Integer(page.per_page));
                values.push(Value::Integer(page.offset()));
                format!("SELECT * FROM ({sql}) LIMIT ? OFFSET ?")
            }
            QueryOp::Project(spec) => match projection_columns(spec) {
                Some(columns) if !columns.is_empty() => {
                    let list = columns
                        .iter()
                        .map(|column| quote_ident(column))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("SELECT {list} FROM ({sql})")
                }
                _ => sql,
            },
        };
    }
    (sql, values)
}

/// Exclusions are resolved against the items column list, the only
/// collection this store serves. Excluding every column degrades to "all".
fn projection_columns(spec: &ProjectionSpec) -> Option<Vec<String>> {
    match spec {
        ProjectionSpec::All => None,
        ProjectionSpec::Include(fields) => Some(fields.clone()),
        ProjectionSpec::Exclude(fields) => Some(
            ITEM_COLUMNS
                .iter()
                .filter(|column| !fields.iter().any(|field| field == *column))
                .map(|column| (*column).to_string())
                .collect(),
        ),
    }
}

fn predicate_clause(predicate: &FilterPredicate, values: &mut Vec<Value>) -> String {
    let column = quote_ident(&predicate.field);
    match &predicate.op {
        FilterOp::Eq(value) => {
            values.push(sql_value(value));
            format!("{column} = ?")
        }
        FilterOp::Ne(value) => {
            values.push(sql_value(value));
            format!("{column} <> ?")
        }
        FilterOp::Gt(value) => {
            values.push(sql_value(value));
            format!("{column} > ?")
        }
        FilterOp::Gte(value) => {
            values.push(sql_value(value));
            format!("{column} >= ?")
        }
        FilterOp::Lt(value) => {
            values.push(sql_value(value));
            format!("{column} < ?")
        }
        FilterOp::Lte(value) => {
            values.push(sql_value(value));
            format!("{column} <= ?")
        }
        FilterOp::Between(lo, hi) => {
            values.push(sql_value(lo));
            values.push(sql_value(hi));
            format!("{column} BETWEEN ? AND ?")
        }
        FilterOp::Exists(true) => format!("{column} IS NOT NULL"),
        FilterOp::Exists(false) => format!("{column} IS NULL"),
    }
}

fn sql_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Text(text) => Value::Text(text.clone()),
        FilterValue::Int(n) => Value::Integer(*n),
    }
}

/// Identifiers come from untrusted filter/sort/projection input; quoting
/// turns an unknown or hostile name into a prepare-time "no such column".
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn like_escape(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
