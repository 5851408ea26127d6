//! In-process [`RemoteStore`] keeping every relation as a list of JSON rows.
//!
//! It honours the same contract as the Postgres store: equality filters,
//! ordering, declared unique constraints, DO-NOTHING upserts and embedded
//! joins. Every call is recorded so callers can assert which round trips
//! happened, and relations can be switched into a failing mode.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use super::remote::{matches_all, EmbeddedSelect, Filter, Order, RemoteStore, Row};
use crate::error::{StoreError, StoreResult};

const INSERTED_AT: &str = "inserted_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Select,
    SelectEmbedded,
    Insert,
    Update,
    Delete,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub relation: String,
}

#[derive(Default)]
struct MemoryState {
    relations: HashMap<String, Vec<Row>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    failures: HashMap<String, String>,
    calls: Vec<StoreCall>,
    last_stamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn record(&mut self, op: StoreOp, relation: &str) -> StoreResult<()> {
        self.calls.push(StoreCall {
            op,
            relation: relation.to_string(),
        });
        match self.failures.get(relation) {
            Some(message) => Err(StoreError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    /// Strictly increasing timestamps so ordering by `inserted_at` is stable.
    fn next_stamp(&mut self) -> String {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp.to_rfc3339()
    }

    fn stamp(&mut self, row: &mut Row) {
        let missing = row.get(INSERTED_AT).map_or(true, Value::is_null);
        if missing {
            let stamp = self.next_stamp();
            row.insert(INSERTED_AT.to_string(), Value::String(stamp));
        }
    }

    fn check_unique(&self, relation: &str, candidate: &Row, others: &[&Row]) -> StoreResult<()> {
        let Some(constraints) = self.unique.get(relation) else {
            return Ok(());
        };
        for columns in constraints {
            let clash = others
                .iter()
                .any(|other| same_on(columns.iter().map(String::as_str), candidate, other));
            if clash {
                return Err(StoreError::UniqueViolation {
                    relation: relation.to_string(),
                    columns: columns.join(", "),
                });
            }
        }
        Ok(())
    }
}

fn same_on<'a>(mut columns: impl Iterator<Item = &'a str>, a: &Row, b: &Row) -> bool {
    columns.all(|column| {
        a.get(column).unwrap_or(&Value::Null) == b.get(column).unwrap_or(&Value::Null)
    })
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declares a unique constraint over `columns` of `relation`.
    pub fn with_unique(self, relation: &str, columns: &[&str]) -> Self {
        self.state()
            .unique
            .entry(relation.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Puts rows straight into a relation without recording a call.
    pub fn seed(&self, relation: &str, rows: impl IntoIterator<Item = Value>) {
        let mut state = self.state();
        let mut seeded = Vec::new();
        for value in rows {
            if let Value::Object(mut row) = value {
                state.stamp(&mut row);
                seeded.push(row);
            }
        }
        state
            .relations
            .entry(relation.to_string())
            .or_default()
            .extend(seeded);
    }

    /// Current contents of a relation, in insertion order.
    pub fn rows(&self, relation: &str) -> Vec<Row> {
        self.state()
            .relations
            .get(relation)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every subsequent call on `relation` fail with `message`.
    pub fn fail_relation(&self, relation: &str, message: &str) {
        self.state()
            .failures
            .insert(relation.to_string(), message.to_string());
    }

    pub fn restore_relation(&self, relation: &str) {
        self.state().failures.remove(relation);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, op: StoreOp, relation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op == op && call.relation == relation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> StoreResult<Vec<Row>> {
        let mut state = self.state();
        state.record(StoreOp::Select, relation)?;

        let mut rows: Vec<Row> = state
            .relations
            .get(relation)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows)
    }

    async fn select_embedded(&self, query: &EmbeddedSelect) -> StoreResult<Vec<Row>> {
        let mut state = self.state();
        state.record(StoreOp::SelectEmbedded, &query.relation)?;

        let empty = Vec::new();
        let parents = state.relations.get(&query.relation).unwrap_or(&empty);
        let links = state.relations.get(&query.through).unwrap_or(&empty);
        let targets = state.relations.get(&query.target).unwrap_or(&empty);

        let mut result = Vec::new();
        for parent in parents.iter().filter(|row| matches_all(row, &query.filters)) {
            let parent_key = parent.get(&query.parent_key).unwrap_or(&Value::Null);

            let embedded: Vec<Value> = links
                .iter()
                .filter(|link| link.get(&query.through_parent) == Some(parent_key))
                .filter(|link| matches_all(link, &query.through_filters))
                .map(|link| {
                    let target_key = link.get(&query.through_target).unwrap_or(&Value::Null);
                    let target = targets
                        .iter()
                        .find(|t| t.get(&query.target_key) == Some(target_key))
                        .map(|t| Value::Object(t.clone()))
                        .unwrap_or(Value::Null);

                    let mut entry = Map::new();
                    entry.insert(query.target.clone(), target);
                    Value::Object(entry)
                })
                .collect();

            let mut row = parent.clone();
            row.insert(query.through.clone(), Value::Array(embedded));
            result.push(row);
        }
        Ok(result)
    }

    async fn insert(&self, relation: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>> {
        let mut state = self.state();
        state.record(StoreOp::Insert, relation)?;

        let mut staged: Vec<Row> = Vec::with_capacity(rows.len());
        for mut row in rows {
            state.stamp(&mut row);
            {
                let existing = state.relations.get(relation);
                let others: Vec<&Row> = existing
                    .into_iter()
                    .flatten()
                    .chain(staged.iter())
                    .collect();
                state.check_unique(relation, &row, &others)?;
            }
            staged.push(row);
        }

        state
            .relations
            .entry(relation.to_string())
            .or_default()
            .extend(staged.iter().cloned());
        Ok(staged)
    }

    async fn update(
        &self,
        relation: &str,
        changes: Row,
        filters: &[Filter],
    ) -> StoreResult<Vec<Row>> {
        let mut state = self.state();
        state.record(StoreOp::Update, relation)?;

        let current = state.relations.get(relation).cloned().unwrap_or_default();
        let mut next = current.clone();
        let mut touched = Vec::new();
        for (index, row) in next.iter_mut().enumerate() {
            if matches_all(row, filters) {
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                touched.push(index);
            }
        }

        for &index in &touched {
            let others: Vec<&Row> = next
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, row)| row)
                .collect();
            state.check_unique(relation, &next[index], &others)?;
        }

        let updated = touched.iter().map(|&i| next[i].clone()).collect();
        if !touched.is_empty() {
            state.relations.insert(relation.to_string(), next);
        }
        Ok(updated)
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> StoreResult<()> {
        let mut state = self.state();
        state.record(StoreOp::Delete, relation)?;

        if let Some(rows) = state.relations.get_mut(relation) {
            rows.retain(|row| !matches_all(row, filters));
        }
        Ok(())
    }

    async fn upsert(&self, relation: &str, rows: Vec<Row>, conflict: &[&str]) -> StoreResult<()> {
        let mut state = self.state();
        state.record(StoreOp::Upsert, relation)?;

        let mut staged: Vec<Row> = Vec::new();
        for mut row in rows {
            let exists = state
                .relations
                .get(relation)
                .into_iter()
                .flatten()
                .chain(staged.iter())
                .any(|other| same_on(conflict.iter().copied(), &row, other));
            if exists {
                continue;
            }
            state.stamp(&mut row);
            staged.push(row);
        }

        state
            .relations
            .entry(relation.to_string())
            .or_default()
            .extend(staged);
        Ok(())
    }
}
