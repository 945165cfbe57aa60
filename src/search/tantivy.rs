//! Tantivy-backed search-index client.
//!
//! One index directory per index name, opened lazily under a shared root.
//! Upserts delete any existing documents for the identifier before adding,
//! so repeated upserts of one id converge to a single entry.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{
    Field, INDEXED, IndexRecordOption, STORED, STRING, Schema, TEXT, Term, Value,
};
use tantivy::{Index, IndexWriter, TantivyDocument, doc};

use crate::model::types::IndexableDocument;
use crate::search::sync::SearchIndexClient;

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    title: Field,
    body: Field,
    owner: Field,
    created_at: Field,
}

/// A free-text match from [`TantivyIndexClient::search`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexHit {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub score: f32,
    pub created_at: Option<i64>,
}

struct IndexHandle {
    index: Index,
    writer: IndexWriter,
    fields: Fields,
}

impl IndexHandle {
    fn open_or_create(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let schema = build_schema();
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_dir(path, schema.clone())?
        };
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .with_context(|| "create index writer")?;
        let fields = fields_from_schema(&index.schema())?;
        Ok(Self {
            index,
            writer,
            fields,
        })
    }

    fn upsert(&mut self, document: &IndexableDocument) -> Result<()> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.id, &document.id));
        self.writer.add_document(doc!(
            self.fields.id => document.id.clone(),
            self.fields.title => document.title.clone(),
            self.fields.body => document.body.clone(),
            self.fields.owner => document.owner.clone(),
            self.fields.created_at => document.created_at,
        ))?;
        self.writer.commit()?;
        Ok(())
    }

    fn contains(&self, doc_id: &str) -> Result<bool> {
        let searcher = self.index.reader()?.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.id, doc_id),
            IndexRecordOption::Basic,
        );
        Ok(searcher.search(&query, &Count)? > 0)
    }

    fn delete(&mut self, doc_id: &str) -> Result<bool> {
        if !self.contains(doc_id)? {
            return Ok(false);
        }
        self.writer
            .delete_term(Term::from_field_text(self.fields.id, doc_id));
        self.writer.commit()?;
        Ok(true)
    }

    fn search(&self, term: &str, limit: usize) -> Result<Vec<IndexHit>> {
        let searcher = self.index.reader()?.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.body]);
        let query = parser.parse_query(term)?;
        let top_docs =
            searcher.search(&query, &TopDocs::with_limit(limit.max(1)).order_by_score())?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let document: TantivyDocument = searcher.doc(addr)?;
            let text = |field: Field| {
                document
                    .get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            hits.push(IndexHit {
                id: text(self.fields.id),
                title: text(self.fields.title),
                owner: text(self.fields.owner),
                score,
                created_at: document
                    .get_first(self.fields.created_at)
                    .and_then(|v| v.as_i64()),
            });
        }
        Ok(hits)
    }
}

/// Manages one Tantivy index per index name under a root directory.
/// Construction is cheap; directories are created on first use.
pub struct TantivyIndexClient {
    root: PathBuf,
    handles: Mutex<HashMap<String, IndexHandle>>,
}

impl TantivyIndexClient {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn with_handle<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut IndexHandle) -> Result<T>,
    ) -> Result<T> {
        let mut handles = self.handles.lock();
        let handle = match handles.entry(name.to_string()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let handle = IndexHandle::open_or_create(&self.root.join(name))
                    .with_context(|| format!("open search index {name}"))?;
                vacant.insert(handle)
            }
        };
        f(handle)
    }

    /// Free-text query over title and body, newest-ranked by relevance.
    pub fn search(&self, index: &str, term: &str, limit: usize) -> Result<Vec<IndexHit>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.with_handle(index, |handle| handle.search(term, limit))
    }
}

impl SearchIndexClient for TantivyIndexClient {
    fn upsert(&self, index: &str, doc: &IndexableDocument) -> Result<()> {
        self.with_handle(index, |handle| handle.upsert(doc))
    }

    fn delete(&self, index: &str, doc_id: &str) -> Result<bool> {
        self.with_handle(index, |handle| handle.delete(doc_id))
    }
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("title", TEXT | STORED);
    schema_builder.add_text_field("body", TEXT);
    schema_builder.add_text_field("owner", STRING | STORED);
    schema_builder.add_i64_field("created_at", INDEXED | STORED);
    schema_builder.build()
}

fn fields_from_schema(schema: &Schema) -> Result<Fields> {
    Ok(Fields {
        id: schema.get_field("id").context("schema missing id")?,
        title: schema.get_field("title").context("schema missing title")?,
        body: schema.get_field("body").context("schema missing body")?,
        owner: schema.get_field("owner").context("schema missing owner")?,
        created_at: schema
            .get_field("created_at")
            .context("schema missing created_at")?,
    })
}
