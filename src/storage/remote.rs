use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// One row of a relation, keyed by column name.
pub type Row = Map<String, Value>;

/// Equality restriction on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

/// Returns true when the row satisfies every filter.
pub fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let ord = compare_values(
            a.get(&self.column).unwrap_or(&Value::Null),
            b.get(&self.column).unwrap_or(&Value::Null),
        );
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}

/// Total order used for sorting JSON cells: nulls first, then booleans,
/// numbers, strings. Arrays and objects compare equal to each other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A parent read that embeds, for each parent row, the rows of a join
/// relation and through them the rows of a target relation.
///
/// Result rows are the parent columns plus one extra column named after
/// `through` holding an array of objects `{ <target>: <target row | null> }`.
#[derive(Debug, Clone)]
pub struct EmbeddedSelect {
    pub relation: String,
    pub filters: Vec<Filter>,
    /// Parent column the join relation points at.
    pub parent_key: String,
    /// Join relation.
    pub through: String,
    /// Join column referencing `parent_key`.
    pub through_parent: String,
    /// Join column referencing `target_key`.
    pub through_target: String,
    /// Extra restrictions on the join rows.
    pub through_filters: Vec<Filter>,
    pub target: String,
    pub target_key: String,
}

/// Query/mutation interface of the relational store behind every
/// collection. All reads and writes go through these calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> StoreResult<Vec<Row>>;

    async fn select_embedded(&self, query: &EmbeddedSelect) -> StoreResult<Vec<Row>>;

    /// Inserts the rows and returns them as stored, defaults filled in.
    async fn insert(&self, relation: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>>;

    /// Applies `changes` to every matching row and returns the updated rows.
    async fn update(&self, relation: &str, changes: Row, filters: &[Filter])
        -> StoreResult<Vec<Row>>;

    async fn delete(&self, relation: &str, filters: &[Filter]) -> StoreResult<()>;

    /// Inserts the rows, skipping any whose `conflict` columns match an
    /// existing row.
    async fn upsert(&self, relation: &str, rows: Vec<Row>, conflict: &[&str]) -> StoreResult<()>;
}
