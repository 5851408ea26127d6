use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{require_text, Record};
use crate::error::AppResult;

/// A payment method ("mode of payment") on file for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMop {
    pub mop_id: String,
    pub player_id: String,
    pub mop: String,
    pub acc_number: String,
    pub inserted_at: DateTime<Utc>,
    pub user_id: String,
}

/// The owning player comes from the collection's player filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlayerMop {
    pub mop: String,
    pub acc_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerMopChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc_number: Option<String>,
}

impl Record for PlayerMop {
    type New = NewPlayerMop;
    type Changes = PlayerMopChanges;

    const RELATION: &'static str = "player_mop";
    const KEY: &'static str = "mop_id";
    const LABEL: &'static str = "payment method";
    const ORDER_BY: &'static str = "mop";
    const ASCENDING: bool = true;

    fn key(&self) -> &str {
        &self.mop_id
    }

    fn owner(&self) -> &str {
        &self.user_id
    }

    fn validate_new(new: &NewPlayerMop) -> AppResult<()> {
        require_text("mop", &new.mop)?;
        require_text("acc_number", &new.acc_number)
    }
}
