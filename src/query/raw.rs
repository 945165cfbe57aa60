//! Boundary query parameters and the tagged filter-predicate types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Control keys consumed by the builder stages. They are excluded from
/// free-form filtering so pagination and sort parameters never leak into
/// WHERE clauses.
pub const RESERVED_KEYS: &[&str] = &["searchTerm", "sort", "page", "limit", "fields"];

pub const SEARCH_TERM_KEY: &str = "searchTerm";
pub const SORT_KEY: &str = "sort";
pub const PAGE_KEY: &str = "page";
pub const LIMIT_KEY: &str = "limit";
pub const FIELDS_KEY: &str = "fields";

/// The raw query map as received at the boundary, plus any predicates
/// installed by augmenters.
///
/// Augmenters and builder stages consume keys by removing them; whatever
/// non-reserved keys remain when `filter()` runs become equality (or
/// operator-encoded) predicates. The whole value is request-scoped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuery {
    params: BTreeMap<String, String>,
    predicates: Vec<FilterPredicate>,
}

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut query = Self::new();
        for (key, value) in pairs {
            query.insert(key, value);
        }
        query
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.predicates.is_empty()
    }

    /// Install a store-ready predicate. Used by augmenters; the builder's
    /// `filter()` stage picks these up alongside the remaining free-form keys.
    pub fn push_predicate(&mut self, predicate: FilterPredicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[FilterPredicate] {
        &self.predicates
    }

    /// Drain every installed predicate and every remaining non-reserved key
    /// (parsed through [`FilterPredicate::parse`]) into one conjunctive set.
    pub(crate) fn take_filters(&mut self) -> Vec<FilterPredicate> {
        let mut filters = std::mem::take(&mut self.predicates);
        let keys: Vec<String> = self
            .params
            .keys()
            .filter(|k| !RESERVED_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        for key in keys {
            if let Some(value) = self.params.remove(&key) {
                filters.push(FilterPredicate::parse(key, &value));
            }
        }
        filters
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawQuery {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// A single field-level constraint; predicates compose conjunctively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq(FilterValue),
    Ne(FilterValue),
    Gt(FilterValue),
    Gte(FilterValue),
    Lt(FilterValue),
    Lte(FilterValue),
    /// Inclusive range.
    Between(FilterValue, FilterValue),
    Exists(bool),
}

/// Filter comparand. Integer-looking boundary strings become `Int` so the
/// store compares them numerically instead of lexically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String),
    Int(i64),
}

impl FilterValue {
    fn from_boundary(raw: &str) -> Self {
        raw.parse::<i64>().map_or_else(|_| Self::Text(raw.to_string()), Self::Int)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl FilterPredicate {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq(value.into()),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gte(value.into()),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lte(value.into()),
        }
    }

    pub fn between(
        field: impl Into<String>,
        lo: impl Into<FilterValue>,
        hi: impl Into<FilterValue>,
    ) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Between(lo.into(), hi.into()),
        }
    }

    /// Parse one boundary `key=value` pair into a predicate.
    ///
    /// Values of the form `gt:V`, `gte:V`, `lt:V`, `lte:V`, `ne:V` encode a
    /// comparison; `exists:true` / `exists:false` encode an existence test.
    /// Anything else, including values whose colon prefix is not a known
    /// operator (`url=https://...`), is a plain equality.
    pub fn parse(field: impl Into<String>, value: &str) -> Self {
        let field = field.into();
        if let Some((op, rest)) = value.split_once(':') {
            let op = match op {
                "gt" => Some(FilterOp::Gt(FilterValue::from_boundary(rest))),
                "gte" => Some(FilterOp::Gte(FilterValue::from_boundary(rest))),
                "lt" => Some(FilterOp::Lt(FilterValue::from_boundary(rest))),
                "lte" => Some(FilterOp::Lte(FilterValue::from_boundary(rest))),
                "ne" => Some(FilterOp::Ne(FilterValue::from_boundary(rest))),
                "exists" => match rest {
                    "true" => Some(FilterOp::Exists(true)),
                    "false" => Some(FilterOp::Exists(false)),
                    _ => None,
                },
                _ => None,
            };
            if let Some(op) = op {
                return Self { field, op };
            }
        }
        Self {
            field,
            op: FilterOp::Eq(FilterValue::from_boundary(value)),
        }
    }
}
