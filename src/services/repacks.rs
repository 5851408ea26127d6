use std::{collections::HashSet, ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};

use super::{
    collection::{to_row, Ticket},
    ids::IdGenerator,
    scoped::{follow, IdentityScoped, ScopedCollection},
};
use crate::{
    error::{AppError, AppResult},
    identity::AuthState,
    models::{Promo, Record, Repack, RepackJoin, RepackPromo, RepackWithPromos},
    storage::{EmbeddedSelect, Filter, RemoteStore, Row},
};

/// Repacks plus their promo links in `repack_promo`. Each successful link
/// or unlink re-reads the repack and publishes it on the detail channel.
pub struct Repacks {
    repacks: ScopedCollection<Repack>,
    detail: watch::Sender<Option<RepackWithPromos>>,
}

impl Repacks {
    pub fn new(store: Arc<dyn RemoteStore>, ids: Arc<dyn IdGenerator>) -> Self {
        let (detail, _rx) = watch::channel(None);
        Self {
            repacks: ScopedCollection::new(store, ids),
            detail,
        }
    }

    pub fn follow(self: &Arc<Self>, auth: watch::Receiver<AuthState>) -> JoinHandle<()> {
        follow(Arc::clone(self), auth)
    }

    /// Observes the most recently read repack with its promos.
    pub fn detail(&self) -> watch::Receiver<Option<RepackWithPromos>> {
        self.detail.subscribe()
    }

    pub fn current_detail(&self) -> Option<RepackWithPromos> {
        self.detail.borrow().clone()
    }

    /// Reads one owned repack joined to its promos.
    pub async fn fetch_with_promos(&self, repack_id: &str) -> Option<RepackWithPromos> {
        let ticket = self.repacks.begin();
        let result = self.try_fetch_with_promos(&ticket, repack_id).await;
        self.repacks.settle(ticket, "fetch_with_promos", result)
    }

    async fn try_fetch_with_promos(
        &self,
        ticket: &Ticket<'_, Repack>,
        repack_id: &str,
    ) -> AppResult<RepackWithPromos> {
        let owner = self
            .repacks
            .require_owner(ticket, "view repack details")?
            .unwrap_or_default();
        tracing::debug!("Fetching repack {} with promos", repack_id);

        let query = EmbeddedSelect {
            relation: Repack::RELATION.to_string(),
            filters: self.repacks.key_filters(ticket, repack_id),
            parent_key: Repack::KEY.to_string(),
            through: RepackPromo::RELATION.to_string(),
            through_parent: "repack_id".to_string(),
            through_target: Promo::KEY.to_string(),
            through_filters: vec![Filter::eq("user_id", owner)],
            target: Promo::RELATION.to_string(),
            target_key: Promo::KEY.to_string(),
        };
        let row = self
            .repacks
            .store()
            .select_embedded(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found(Repack::LABEL, repack_id))?;
        let view = RepackJoin::from_row(row)?.flatten();

        self.repacks.apply(ticket, |_| {
            self.detail.send_replace(Some(view.clone()));
        });
        Ok(view)
    }

    /// Links every promo in `promo_ids` to the repack. Pairs that are
    /// already linked are left alone. Returns true once the links are in
    /// place and the detail view has been refreshed.
    pub async fn add_promos_to_repack<I, S>(&self, repack_id: &str, promo_ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let promo_ids: Vec<String> = promo_ids
            .into_iter()
            .map(Into::into)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let ticket = self.repacks.begin();
        let result = self.try_link(&ticket, repack_id, &promo_ids).await;
        self.repacks
            .settle(ticket, "add_promos_to_repack", result)
            .is_some()
    }

    async fn try_link(
        &self,
        ticket: &Ticket<'_, Repack>,
        repack_id: &str,
        promo_ids: &[String],
    ) -> AppResult<()> {
        let owner = self
            .repacks
            .require_owner(ticket, "add promos to a repack")?
            .unwrap_or_default();
        if promo_ids.is_empty() {
            return Ok(());
        }
        self.require_repack(ticket, repack_id).await?;

        let rows = promo_ids
            .iter()
            .map(|promo_id| to_row(&RepackPromo::link(repack_id, promo_id, owner)))
            .collect::<AppResult<Vec<Row>>>()?;
        self.repacks
            .store()
            .upsert(RepackPromo::RELATION, rows, &RepackPromo::CONFLICT)
            .await?;
        tracing::info!("Linked {} promos to repack {}", promo_ids.len(), repack_id);

        self.try_fetch_with_promos(ticket, repack_id).await?;
        Ok(())
    }

    /// Fails with NotFound unless the repack exists in the caller's scope.
    async fn require_repack(&self, ticket: &Ticket<'_, Repack>, repack_id: &str) -> AppResult<()> {
        let filters = self.repacks.key_filters(ticket, repack_id);
        let found = self
            .repacks
            .store()
            .select(Repack::RELATION, &filters, None)
            .await?;
        if found.is_empty() {
            return Err(AppError::not_found(Repack::LABEL, repack_id));
        }
        Ok(())
    }

    /// Unlinks one promo from the repack. A missing link is not an error.
    pub async fn remove_promo_from_repack(&self, repack_id: &str, promo_id: &str) -> bool {
        let ticket = self.repacks.begin();
        let result = self.try_unlink(&ticket, repack_id, promo_id).await;
        self.repacks
            .settle(ticket, "remove_promo_from_repack", result)
            .is_some()
    }

    async fn try_unlink(
        &self,
        ticket: &Ticket<'_, Repack>,
        repack_id: &str,
        promo_id: &str,
    ) -> AppResult<()> {
        let owner = self
            .repacks
            .require_owner(ticket, "remove a promo from a repack")?
            .unwrap_or_default();

        let filters = [
            Filter::eq("repack_id", repack_id),
            Filter::eq("promo_id", promo_id),
            Filter::eq("user_id", owner),
        ];
        self.repacks
            .store()
            .delete(RepackPromo::RELATION, &filters)
            .await?;
        tracing::info!("Unlinked promo {} from repack {}", promo_id, repack_id);

        self.try_fetch_with_promos(ticket, repack_id).await?;
        Ok(())
    }
}

impl Deref for Repacks {
    type Target = ScopedCollection<Repack>;

    fn deref(&self) -> &ScopedCollection<Repack> {
        &self.repacks
    }
}

#[async_trait]
impl IdentityScoped for Repacks {
    fn set_identity(&self, auth: &AuthState) -> bool {
        if !self.repacks.set_identity(auth) {
            return false;
        }
        self.detail.send_replace(None);
        true
    }

    async fn refresh(&self) {
        self.repacks.refresh().await;
    }
}
