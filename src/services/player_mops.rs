use std::sync::Arc;

use super::{collection::CollectionOptions, ids::IdGenerator, scoped::ScopedCollection};
use crate::{
    models::PlayerMop,
    storage::{Filter, RemoteStore},
};

/// Payment methods of one player, ordered by method name.
pub type PlayerMops = ScopedCollection<PlayerMop>;

impl ScopedCollection<PlayerMop> {
    pub fn for_player(
        store: Arc<dyn RemoteStore>,
        ids: Arc<dyn IdGenerator>,
        player_id: &str,
    ) -> Self {
        let options =
            CollectionOptions::for_record::<PlayerMop>().with_filter(Filter::eq("player_id", player_id));
        Self::with_options(store, ids, options)
    }

    pub fn player_id(&self) -> Option<&str> {
        self.options()
            .filter
            .as_ref()
            .and_then(|filter| filter.value.as_str())
    }
}
