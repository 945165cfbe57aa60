//! The staged query builder.
//!
//! A [`SelectQuery`] is a lazy description of a read: a collection name plus
//! an ordered list of operations. [`QueryBuilder`] appends one operation per
//! stage, in call order, consuming the reserved control keys as it goes.
//! Nothing executes here; the store compiles and runs the result, wrapping
//! each operation around the previous one. That makes stage order
//! load-bearing: paginating before sorting limits an unordered set, which is
//! why the conventional order is search, filter, sort, paginate, fields.

use serde::{Deserialize, Serialize};

use crate::query::raw::{
    FIELDS_KEY, FilterPredicate, LIMIT_KEY, PAGE_KEY, RawQuery, SEARCH_TERM_KEY, SORT_KEY,
};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// A composed, still-lazy query over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    collection: String,
    ops: Vec<QueryOp>,
}

impl SelectQuery {
    /// Base retrieval handle scoped to a collection. No operations yet.
    pub fn over(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ops: Vec::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    fn push(&mut self, op: QueryOp) {
        self.ops.push(op);
    }
}

/// One query transform, applied over the result of everything before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOp {
    /// Free-text containment scope over the named fields.
    Search { term: String, fields: Vec<String> },
    /// Conjunction of field predicates.
    Filter(Vec<FilterPredicate>),
    Sort(SortSpec),
    Paginate(PageSpec),
    Project(ProjectionSpec),
}

/// Ordered `(field, direction)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec(pub Vec<(String, SortDirection)>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortSpec {
    /// Parse a comma-separated field list; a `-` prefix means descending.
    /// Empty input yields an empty spec (callers substitute the default).
    pub fn parse(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty() && *entry != "-")
            .map(|entry| match entry.strip_prefix('-') {
                Some(field) => (field.to_string(), SortDirection::Desc),
                None => (entry.to_string(), SortDirection::Asc),
            })
            .collect();
        Self(keys)
    }

    /// Newest first, with descending id as the insertion-order tiebreak.
    pub fn newest_first() -> Self {
        Self(vec![
            ("created_at".to_string(), SortDirection::Desc),
            ("id".to_string(), SortDirection::Desc),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 1-based page selection. `offset = (page - 1) * per_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub page: i64,
    pub per_page: i64,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageSpec {
    /// Non-positive or non-numeric values fall back to the defaults rather
    /// than erroring; pagination is an optional filter like any other.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        Self {
            page: parse_positive(page, DEFAULT_PAGE),
            per_page: parse_positive(limit, DEFAULT_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

fn parse_positive(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

/// Field subset for the result shape. Include and exclude are mutually
/// exclusive; any `-`-prefixed entry switches the whole spec to exclude
/// mode, and unprefixed entries are then ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionSpec {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl ProjectionSpec {
    pub fn parse(raw: &str) -> Self {
        let entries: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty() && *entry != "-")
            .collect();
        if entries.is_empty() {
            return Self::All;
        }
        let excluded: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.strip_prefix('-'))
            .map(str::to_string)
            .collect();
        if excluded.is_empty() {
            Self::Include(entries.iter().map(|e| (*e).to_string()).collect())
        } else {
            Self::Exclude(excluded)
        }
    }
}

/// Applies the builder stages onto a base query, consuming reserved keys
/// from the raw map in call order.
#[derive(Debug)]
pub struct QueryBuilder {
    query: SelectQuery,
    raw: RawQuery,
}

impl QueryBuilder {
    pub fn new(base: SelectQuery, raw: RawQuery) -> Self {
        Self { query: base, raw }
    }

    /// Consume `searchTerm` into a free-text containment scope over the
    /// given fields. Blank terms scope nothing.
    pub fn search(mut self, fields: &[&str]) -> Self {
        if let Some(term) = self.raw.remove(SEARCH_TERM_KEY) {
            let term = term.trim();
            if !term.is_empty() && !fields.is_empty() {
                self.query.push(QueryOp::Search {
                    term: term.to_string(),
                    fields: fields.iter().map(|f| (*f).to_string()).collect(),
                });
            }
        }
        self
    }

    /// Turn every remaining non-reserved key, plus any augmenter-installed
    /// predicates, into one conjunctive filter.
    pub fn filter(mut self) -> Self {
        let filters = self.raw.take_filters();
        if !filters.is_empty() {
            self.query.push(QueryOp::Filter(filters));
        }
        self
    }

    /// Consume `sort`; absent (or blank) input sorts newest first.
    pub fn sort(mut self) -> Self {
        let spec = self
            .raw
            .remove(SORT_KEY)
            .map(|raw| SortSpec::parse(&raw))
            .filter(|spec| !spec.is_empty())
            .unwrap_or_else(SortSpec::newest_first);
        self.query.push(QueryOp::Sort(spec));
        self
    }

    /// Consume `page` and `limit` into a skip/limit pair.
    pub fn paginate(mut self) -> Self {
        let spec = PageSpec::parse(
            self.raw.remove(PAGE_KEY).as_deref(),
            self.raw.remove(LIMIT_KEY).as_deref(),
        );
        self.query.push(QueryOp::Paginate(spec));
        self
    }

    /// Consume `fields` into a projection of the result shape.
    pub fn fields(mut self) -> Self {
        let spec = self
            .raw
            .remove(FIELDS_KEY)
            .map(|raw| ProjectionSpec::parse(&raw))
            .unwrap_or_default();
        if spec != ProjectionSpec::All {
            self.query.push(QueryOp::Project(spec));
        }
        self
    }

    /// The composed query. Execution belongs to the store.
    pub fn build(self) -> SelectQuery {
        self.query
    }
}
