use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::{sync::watch, task::JoinHandle};

use super::{
    collection::{to_row, Ticket},
    ids::IdGenerator,
    scoped::{follow, IdentityScoped, ScopedCollection},
};
use crate::{
    error::AppResult,
    identity::AuthState,
    models::{Player, PlayerChanges, Record},
    storage::{BlobStorage, RemoteStore},
};

const PICTURE_COLUMN: &str = "profile_pic_url";

/// What to do with a player's profile picture alongside an update.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfilePicture {
    Keep,
    Replace {
        data: Bytes,
        file_name: String,
        content_type: String,
    },
    Clear,
}

/// Player collection with profile-picture handling.
pub struct Players {
    players: ScopedCollection<Player>,
    blobs: Arc<dyn BlobStorage>,
}

impl Players {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        ids: Arc<dyn IdGenerator>,
        blobs: Arc<dyn BlobStorage>,
    ) -> Self {
        Self {
            players: ScopedCollection::new(store, ids),
            blobs,
        }
    }

    pub fn follow(self: &Arc<Self>, auth: watch::Receiver<AuthState>) -> JoinHandle<()> {
        follow(Arc::clone(self), auth)
    }

    /// Updates a player, uploading or clearing the profile picture first.
    pub async fn update_with_picture(
        &self,
        player_id: &str,
        changes: &PlayerChanges,
        picture: ProfilePicture,
    ) -> Option<Player> {
        let ticket = self.players.begin();
        let result = self
            .try_update_with_picture(&ticket, player_id, changes, picture)
            .await;
        self.players.settle(ticket, "update", result)
    }

    async fn try_update_with_picture(
        &self,
        ticket: &Ticket<'_, Player>,
        player_id: &str,
        changes: &PlayerChanges,
        picture: ProfilePicture,
    ) -> AppResult<Player> {
        let owner = self
            .players
            .require_owner(ticket, "update a player")?
            .unwrap_or_default();
        Player::validate_changes(changes)?;
        let mut row = to_row(changes)?;
        self.players.check_unique(&row, Some(player_id), &[])?;

        match picture {
            ProfilePicture::Keep => {}
            ProfilePicture::Clear => {
                row.insert(PICTURE_COLUMN.to_string(), Value::Null);
            }
            ProfilePicture::Replace {
                data,
                file_name,
                content_type,
            } => {
                let path = picture_path(owner, player_id, &file_name, &content_type);
                tracing::debug!("Uploading profile picture to {}", path);
                let url = self.blobs.upload(&path, data, &content_type).await?;
                row.insert(PICTURE_COLUMN.to_string(), Value::String(url));
            }
        }

        self.players.try_update_row(ticket, player_id, row).await
    }

    /// Deletes a player and, best-effort, its profile picture.
    pub async fn remove(&self, player_id: &str) -> bool {
        let ticket = self.players.begin();
        let result = self.try_remove(&ticket, player_id).await;
        self.players.settle(ticket, "remove", result).is_some()
    }

    async fn try_remove(&self, ticket: &Ticket<'_, Player>, player_id: &str) -> AppResult<()> {
        self.players.require_owner(ticket, "delete a player")?;
        let filters = self.players.key_filters(ticket, player_id);
        let picture = self
            .players
            .store()
            .select(Player::RELATION, &filters, None)
            .await?
            .into_iter()
            .next()
            .and_then(|row| row.get(PICTURE_COLUMN).and_then(Value::as_str).map(str::to_string));

        self.players.try_remove(ticket, player_id).await?;

        if let Some(path) = picture.as_deref().and_then(stored_path) {
            if let Err(e) = self.blobs.remove(&path).await {
                tracing::warn!("Could not delete profile picture {}: {}", path, e);
            }
        }
        Ok(())
    }
}

impl Deref for Players {
    type Target = ScopedCollection<Player>;

    fn deref(&self) -> &ScopedCollection<Player> {
        &self.players
    }
}

#[async_trait]
impl IdentityScoped for Players {
    fn set_identity(&self, auth: &AuthState) -> bool {
        self.players.set_identity(auth)
    }

    async fn refresh(&self) {
        self.players.refresh().await;
    }
}

/// `<owner>/<player_id>.<ext>`, taking the extension from the file name and
/// falling back to the content type.
fn picture_path(owner: &str, player_id: &str, file_name: &str, content_type: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
        .unwrap_or_else(|| extension_for(content_type));
    format!("{}/{}.{}", owner, player_id, extension)
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Object path of a stored picture: the last two segments of its URL.
fn stored_path(url: &str) -> Option<String> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let file = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next().filter(|s| !s.is_empty() && !s.ends_with(':'))?;
    Some(format!("{}/{}", owner, file))
}
