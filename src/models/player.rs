use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{require_text, Record};
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub name: String,
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "contactNumber", default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "contactNumber")]
    pub contact_number: Option<String>,
}

impl NewPlayer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// `Some(None)` on an optional column clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "fullName", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Option<String>>,
    #[serde(rename = "contactNumber", skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<Option<String>>,
}

impl Record for Player {
    type New = NewPlayer;
    type Changes = PlayerChanges;

    const RELATION: &'static str = "players";
    const KEY: &'static str = "player_id";
    const LABEL: &'static str = "player";
    const UNIQUE_FIELD: Option<&'static str> = Some("name");

    fn key(&self) -> &str {
        &self.player_id
    }

    fn owner(&self) -> &str {
        &self.user_id
    }

    fn validate_new(new: &NewPlayer) -> AppResult<()> {
        require_text("name", &new.name)
    }

    fn validate_changes(changes: &PlayerChanges) -> AppResult<()> {
        match &changes.name {
            Some(name) => require_text("name", name),
            None => Ok(()),
        }
    }
}
