use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};

use super::{
    collection::{Collection, CollectionOptions},
    ids::IdGenerator,
};
use crate::{identity::AuthState, models::Record, storage::RemoteStore};

#[async_trait]
pub trait IdentityScoped: Send + Sync + 'static {
    /// Adopts the identity carried by `auth`. Returns true when the scope
    /// changed.
    fn set_identity(&self, auth: &AuthState) -> bool;

    /// Reloads the data of the current scope.
    async fn refresh(&self);

    /// Adopts `auth` and reloads when it names a new identity.
    async fn apply_identity(&self, auth: &AuthState) -> bool {
        let changed = self.set_identity(auth);
        if changed && auth.identity().is_some() {
            self.refresh().await;
        }
        changed
    }
}

/// Keeps `scoped` in step with an identity signal until the provider is
/// dropped.
pub fn follow<S: IdentityScoped>(
    scoped: Arc<S>,
    mut auth: watch::Receiver<AuthState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = auth.borrow_and_update().clone();
            if scoped.set_identity(&state) && state.identity().is_some() {
                let scoped = Arc::clone(&scoped);
                tokio::spawn(async move { scoped.refresh().await });
            }
            if auth.changed().await.is_err() {
                tracing::debug!("Identity provider closed, no longer following");
                break;
            }
        }
    })
}

pub struct ScopedCollection<T: Record> {
    collection: Collection<T>,
}

impl<T: Record> ScopedCollection<T> {
    pub fn new(store: Arc<dyn RemoteStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self::with_options(store, ids, CollectionOptions::for_record::<T>())
    }

    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        ids: Arc<dyn IdGenerator>,
        options: CollectionOptions,
    ) -> Self {
        Self {
            collection: Collection::with_options(store, ids, options),
        }
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub fn follow(self: &Arc<Self>, auth: watch::Receiver<AuthState>) -> JoinHandle<()> {
        follow(Arc::clone(self), auth)
    }
}

impl<T: Record> Deref for ScopedCollection<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Collection<T> {
        &self.collection
    }
}

#[async_trait]
impl<T: Record> IdentityScoped for ScopedCollection<T> {
    fn set_identity(&self, auth: &AuthState) -> bool {
        let owner = auth.identity().map(str::to_string);
        if !self.collection.rescope(owner) {
            return false;
        }
        match auth.identity() {
            Some(id) => tracing::info!("{} now scoped to identity {}", T::RELATION, id),
            None => tracing::info!("{} cleared after sign-out", T::RELATION),
        }
        true
    }

    async fn refresh(&self) {
        self.collection.refetch().await;
    }
}
