#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Notify, Semaphore};

use tcg_records::{
    identity::AuthState,
    models::{NewCard, NewPromo, NewRepack, RepackStatus},
    storage::{EmbeddedSelect, Filter, Order, Row},
    IdGenerator, IdentityScoped, MemoryStore, RemoteStore, SequentialIds, StoreResult,
};

pub const U1: &str = "U1";
pub const U2: &str = "U2";

/// Memory store with the constraints the migrations declare.
pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_unique("repack_promo", &["repack_id", "promo_id"]))
}

pub fn ids(prefix: &str) -> Arc<dyn IdGenerator> {
    Arc::new(SequentialIds::new(prefix))
}

pub fn sign_in<S: IdentityScoped>(scoped: &S, identity: &str) {
    scoped.set_identity(&AuthState::signed_in(identity));
}

pub fn sign_out<S: IdentityScoped>(scoped: &S) {
    scoped.set_identity(&AuthState::signed_out());
}

pub fn booster_bonus() -> NewPromo {
    NewPromo {
        title: "Booster Bonus".to_string(),
        qty: 1,
        free: Some("1 sleeve".to_string()),
        price: 9.99,
    }
}

pub fn promo(title: &str, price: f64) -> NewPromo {
    NewPromo {
        title: title.to_string(),
        qty: 1,
        free: None,
        price,
    }
}

pub fn repack(title: &str) -> NewRepack {
    NewRepack {
        title: title.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 6, 14).unwrap_or_default(),
        quantity: 20,
        price: 150.0,
        status: RepackStatus::available(),
    }
}

pub fn card(code: &str, name: &str) -> NewCard {
    NewCard {
        display_name: name.to_string(),
        box_name: "Base Set".to_string(),
        card_code: code.to_string(),
        image_name: None,
    }
}

/// Polls `check` until it holds, yielding to spawned tasks in between.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Holds every call on one relation until released.
pub struct GatedStore {
    inner: Arc<MemoryStore>,
    relation: String,
    gate: Semaphore,
    entered: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>, relation: &str) -> Self {
        Self {
            inner,
            relation: relation.to_string(),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    /// Lets `count` held calls through.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Resolves once a call has reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    async fn hold(&self, relation: &str) {
        if relation != self.relation {
            return;
        }
        self.entered.notify_one();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl RemoteStore for GatedStore {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> StoreResult<Vec<Row>> {
        self.hold(relation).await;
        self.inner.select(relation, filters, order).await
    }

    async fn select_embedded(&self, query: &EmbeddedSelect) -> StoreResult<Vec<Row>> {
        self.hold(&query.relation).await;
        self.inner.select_embedded(query).await
    }

    async fn insert(&self, relation: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>> {
        self.hold(relation).await;
        self.inner.insert(relation, rows).await
    }

    async fn update(&self, relation: &str, changes: Row, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        self.hold(relation).await;
        self.inner.update(relation, changes, filters).await
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> StoreResult<()> {
        self.hold(relation).await;
        self.inner.delete(relation, filters).await
    }

    async fn upsert(&self, relation: &str, rows: Vec<Row>, conflict: &[&str]) -> StoreResult<()> {
        self.hold(relation).await;
        self.inner.upsert(relation, rows, conflict).await
    }
}
