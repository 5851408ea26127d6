//! Generic CRUD accessor over one relation with a locally cached list.
//!
//! Successful mutations patch the cached list in place instead of
//! re-reading the relation. Uniqueness is checked against the cached list
//! only, so it is advisory: two writers that have not seen each other's
//! rows can both pass it. A unique constraint on the relation is what
//! actually guarantees it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use super::{
    ids::IdGenerator,
    status::{OpState, Status},
};
use crate::{
    error::{AppError, AppResult, StoreError},
    models::Record,
    storage::{Filter, Order, RemoteStore, Row},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOptions {
    pub order: Order,
    pub unique_field: Option<String>,
    /// Static restriction applied to every read and write; inserted rows
    /// inherit its value.
    pub filter: Option<Filter>,
    /// Column holding the owning identity. `None` for relations that are not
    /// owner-scoped.
    pub owner_column: Option<String>,
}

impl CollectionOptions {
    pub fn for_record<T: Record>() -> Self {
        Self {
            order: Order {
                column: T::ORDER_BY.to_string(),
                ascending: T::ASCENDING,
            },
            unique_field: T::UNIQUE_FIELD.map(str::to_string),
            filter: None,
            owner_column: T::OWNER_COLUMN.map(str::to_string),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique_field = Some(field.into());
        self
    }

    pub fn unscoped(mut self) -> Self {
        self.owner_column = None;
        self
    }
}

struct Inner<T> {
    items: Vec<T>,
    owner: Option<String>,
    ops: OpState,
}

pub struct Collection<T: Record> {
    store: Arc<dyn RemoteStore>,
    ids: Arc<dyn IdGenerator>,
    options: CollectionOptions,
    inner: Mutex<Inner<T>>,
}

/// An operation in flight. Dropping it settles the loading state, whether
/// the operation completed, failed or was cancelled.
pub(crate) struct Ticket<'a, T: Record> {
    collection: &'a Collection<T>,
    epoch: u64,
    owner: Option<String>,
}

impl<T: Record> Ticket<'_, T> {
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}

impl<T: Record> Drop for Ticket<'_, T> {
    fn drop(&mut self) {
        self.collection.inner().ops.finish(self.epoch);
    }
}

pub(crate) fn decode<T: Record>(row: Row) -> AppResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::from(e).into())
}

pub(crate) fn to_row<P: Serialize>(payload: &P) -> AppResult<Row> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(AppError::Validation(format!(
            "Expected an object payload, got {}",
            other
        ))),
        Err(e) => Err(AppError::Validation(e.to_string())),
    }
}

impl<T: Record> Collection<T> {
    pub fn new(store: Arc<dyn RemoteStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self::with_options(store, ids, CollectionOptions::for_record::<T>())
    }

    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        ids: Arc<dyn IdGenerator>,
        options: CollectionOptions,
    ) -> Self {
        Self {
            store,
            ids,
            options,
            inner: Mutex::new(Inner {
                items: Vec::new(),
                owner: None,
                ops: OpState::default(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Readers

    pub fn items(&self) -> Vec<T> {
        self.inner().items.clone()
    }

    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner().items)
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.inner().items.iter().find(|item| item.key() == key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().items.is_empty()
    }

    pub fn loading(&self) -> bool {
        self.inner().ops.loading()
    }

    pub fn error(&self) -> Option<String> {
        self.inner().ops.error().map(ToString::to_string)
    }

    pub fn last_error(&self) -> Option<AppError> {
        self.inner().ops.error().cloned()
    }

    pub fn status(&self) -> Status {
        self.inner().ops.status()
    }

    pub fn owner(&self) -> Option<String> {
        self.inner().owner.clone()
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Resets the error without touching data or loading state.
    pub fn clear_error(&self) {
        self.inner().ops.clear_error();
    }

    /// Switches the owner scope. The cached list is dropped, the state goes
    /// back to idle and operations still in flight lose the right to apply
    /// their results. Returns false when the owner is unchanged.
    pub fn rescope(&self, owner: Option<String>) -> bool {
        let mut inner = self.inner();
        if inner.owner == owner {
            return false;
        }
        inner.items.clear();
        inner.ops.reset();
        inner.owner = owner;
        true
    }

    // Operation plumbing

    pub(crate) fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub(crate) fn begin(&self) -> Ticket<'_, T> {
        let mut inner = self.inner();
        let epoch = inner.ops.begin();
        Ticket {
            collection: self,
            epoch,
            owner: inner.owner.clone(),
        }
    }

    pub(crate) fn is_current(&self, ticket: &Ticket<'_, T>) -> bool {
        self.inner().ops.is_current(ticket.epoch)
    }

    /// Turns an operation result into the sentinel handed to callers,
    /// recording the error on failure.
    pub(crate) fn settle<R>(&self, ticket: Ticket<'_, T>, op: &str, result: AppResult<R>) -> Option<R> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!("Error during {} on {}: {}", op, T::RELATION, err);
                if !self.inner().ops.fail(ticket.epoch, err) {
                    tracing::warn!("Discarded error from stale {} on {}", op, T::RELATION);
                }
                None
            }
        }
    }

    /// Runs `f` on the cached list if the ticket still belongs to the
    /// current owner scope.
    pub(crate) fn apply(&self, ticket: &Ticket<'_, T>, f: impl FnOnce(&mut Vec<T>)) -> bool {
        let mut inner = self.inner();
        if !inner.ops.is_current(ticket.epoch) {
            tracing::warn!("Dropping stale {} response", T::RELATION);
            return false;
        }
        f(&mut inner.items);
        true
    }

    pub(crate) fn require_owner<'t>(
        &self,
        ticket: &'t Ticket<'_, T>,
        action: &str,
    ) -> AppResult<Option<&'t str>> {
        match (&self.options.owner_column, ticket.owner()) {
            (Some(_), None) => Err(AppError::NotAuthenticated(action.to_string())),
            (_, owner) => Ok(owner),
        }
    }

    pub(crate) fn scope_filters(&self, ticket: &Ticket<'_, T>) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(filter) = &self.options.filter {
            filters.push(filter.clone());
        }
        if let (Some(column), Some(owner)) = (&self.options.owner_column, ticket.owner()) {
            filters.push(Filter::eq(column.as_str(), owner));
        }
        filters
    }

    pub(crate) fn key_filters(&self, ticket: &Ticket<'_, T>, key: &str) -> Vec<Filter> {
        let mut filters = vec![Filter::eq(T::KEY, key)];
        filters.extend(self.scope_filters(ticket));
        filters
    }

    /// Fills in the generated key, the owner and the static filter column.
    fn complete_row(&self, ticket: &Ticket<'_, T>, row: &mut Row) {
        row.insert(T::KEY.to_string(), Value::String(self.ids.generate()));
        if let (Some(column), Some(owner)) = (&self.options.owner_column, ticket.owner()) {
            row.insert(column.clone(), Value::String(owner.to_string()));
        }
        if let Some(filter) = &self.options.filter {
            row.entry(filter.column.clone())
                .or_insert_with(|| filter.value.clone());
        }
    }

    pub(crate) fn check_unique(&self, row: &Row, except: Option<&str>, staged: &[&Row]) -> AppResult<()> {
        let Some(field) = &self.options.unique_field else {
            return Ok(());
        };
        let Some(value) = row.get(field) else {
            return Ok(());
        };

        let in_list = self.with_items(|items| {
            items
                .iter()
                .filter(|item| except.map_or(true, |key| item.key() != key))
                .any(|item| item.field(field).as_ref() == Some(value))
        });
        let in_batch = staged.iter().any(|other| other.get(field) == Some(value));

        match (in_list || in_batch, except) {
            (false, _) => Ok(()),
            (true, None) => Err(AppError::Duplicate {
                field: field.clone(),
            }),
            (true, Some(_)) => Err(AppError::DuplicateOnUpdate {
                field: field.clone(),
            }),
        }
    }

    /// New rows go where the configured order would put them.
    fn place(&self, items: &mut Vec<T>, records: Vec<T>) {
        if self.options.order.ascending {
            items.extend(records);
        } else {
            let older = std::mem::replace(items, records);
            items.extend(older);
        }
    }

    // Operations

    /// Re-reads the relation with the configured scope and static filter.
    pub async fn refetch(&self) -> bool {
        self.fetch(None).await
    }

    /// Replaces the cached list with the relation's rows, optionally
    /// narrowed by one more equality filter. On failure the list is kept.
    /// Returns true when the list was replaced.
    pub async fn fetch(&self, filter: Option<Filter>) -> bool {
        let ticket = self.begin();
        if self.options.owner_column.is_some() && ticket.owner().is_none() {
            tracing::debug!("Skipping {} fetch without an identity", T::RELATION);
            return false;
        }
        let result = self.try_fetch(&ticket, filter).await;
        self.settle(ticket, "fetch", result).unwrap_or(false)
    }

    async fn try_fetch(&self, ticket: &Ticket<'_, T>, filter: Option<Filter>) -> AppResult<bool> {
        let mut filters = self.scope_filters(ticket);
        filters.extend(filter);
        tracing::debug!("Fetching {} with {} filters", T::RELATION, filters.len());

        let rows = self
            .store
            .select(T::RELATION, &filters, Some(&self.options.order))
            .await?;
        let records = rows.into_iter().map(decode).collect::<AppResult<Vec<T>>>()?;
        let count = records.len();

        let applied = self.apply(ticket, |items| *items = records);
        if applied {
            tracing::debug!("Fetched {} {} rows", count, T::RELATION);
        }
        Ok(applied)
    }

    /// Reads one owned row by key without touching the cached list.
    pub async fn fetch_one(&self, key: &str) -> Option<T> {
        let ticket = self.begin();
        let result = self.try_fetch_one(&ticket, key).await;
        self.settle(ticket, "fetch_one", result)
    }

    async fn try_fetch_one(&self, ticket: &Ticket<'_, T>, key: &str) -> AppResult<T> {
        self.require_owner(ticket, &format!("view {} details", T::LABEL))?;
        let filters = self.key_filters(ticket, key);

        let rows = self.store.select(T::RELATION, &filters, None).await?;
        match rows.into_iter().next() {
            Some(row) => decode(row),
            None => Err(AppError::not_found(T::LABEL, key)),
        }
    }

    pub async fn add(&self, new: T::New) -> Option<T> {
        let ticket = self.begin();
        let result = self.try_add(&ticket, new).await;
        self.settle(ticket, "add", result)
    }

    async fn try_add(&self, ticket: &Ticket<'_, T>, new: T::New) -> AppResult<T> {
        self.require_owner(ticket, &format!("add a {}", T::LABEL))?;
        T::validate_new(&new)?;
        let mut row = to_row(&new)?;
        self.check_unique(&row, None, &[])?;
        self.complete_row(ticket, &mut row);

        let inserted = self.store.insert(T::RELATION, vec![row]).await?;
        let record: T = match inserted.into_iter().next() {
            Some(row) => decode(row)?,
            None => {
                return Err(AppError::Remote(format!(
                    "Insert into {} returned no row",
                    T::RELATION
                )))
            }
        };

        self.apply(ticket, |items| self.place(items, vec![record.clone()]));
        tracing::info!("Added {} {}", T::LABEL, record.key());
        Ok(record)
    }

    /// Inserts several records in one remote call.
    pub async fn add_many(&self, batch: Vec<T::New>) -> Option<Vec<T>> {
        let ticket = self.begin();
        let result = self.try_add_many(&ticket, batch).await;
        self.settle(ticket, "add_many", result)
    }

    async fn try_add_many(&self, ticket: &Ticket<'_, T>, batch: Vec<T::New>) -> AppResult<Vec<T>> {
        self.require_owner(ticket, &format!("add a {}", T::LABEL))?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows: Vec<Row> = Vec::with_capacity(batch.len());
        for new in &batch {
            T::validate_new(new)?;
            let row = to_row(new)?;
            let staged: Vec<&Row> = rows.iter().collect();
            self.check_unique(&row, None, &staged)?;
            rows.push(row);
        }
        for row in rows.iter_mut() {
            self.complete_row(ticket, row);
        }

        let inserted = self.store.insert(T::RELATION, rows).await?;
        let records = inserted
            .into_iter()
            .map(decode)
            .collect::<AppResult<Vec<T>>>()?;

        self.apply(ticket, |items| self.place(items, records.clone()));
        tracing::info!("Added {} {} rows", records.len(), T::RELATION);
        Ok(records)
    }

    pub async fn update(&self, key: &str, changes: &T::Changes) -> Option<T> {
        let ticket = self.begin();
        let action = format!("update a {}", T::LABEL);
        let prepared = self
            .require_owner(&ticket, &action)
            .and_then(|_| T::validate_changes(changes))
            .and_then(|_| to_row(changes));
        let result = match prepared {
            Ok(row) => self.try_update_row(&ticket, key, row).await,
            Err(err) => Err(err),
        };
        self.settle(ticket, "update", result)
    }

    pub(crate) async fn try_update_row(
        &self,
        ticket: &Ticket<'_, T>,
        key: &str,
        row: Row,
    ) -> AppResult<T> {
        self.require_owner(ticket, &format!("update a {}", T::LABEL))?;
        self.check_unique(&row, Some(key), &[])?;
        let filters = self.key_filters(ticket, key);

        let updated = self.store.update(T::RELATION, row, &filters).await?;
        let record: T = match updated.into_iter().next() {
            Some(row) => decode(row)?,
            None => return Err(AppError::not_found(T::LABEL, key)),
        };

        self.apply(ticket, |items| {
            if let Some(slot) = items.iter_mut().find(|item| item.key() == key) {
                *slot = record.clone();
            }
        });
        tracing::info!("Updated {} {}", T::LABEL, key);
        Ok(record)
    }

    /// Deletes the owned row with `key`. Returns true on success.
    pub async fn remove(&self, key: &str) -> bool {
        let ticket = self.begin();
        let result = self.try_remove(&ticket, key).await;
        self.settle(ticket, "remove", result).is_some()
    }

    pub(crate) async fn try_remove(&self, ticket: &Ticket<'_, T>, key: &str) -> AppResult<()> {
        self.require_owner(ticket, &format!("delete a {}", T::LABEL))?;
        let filters = self.key_filters(ticket, key);

        self.store.delete(T::RELATION, &filters).await?;
        self.apply(ticket, |items| items.retain(|item| item.key() != key));
        tracing::info!("Deleted {} {}", T::LABEL, key);
        Ok(())
    }
}
