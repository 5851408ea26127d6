use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{require_text, Record};
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub card_id: String,
    pub display_name: String,
    pub box_name: String,
    pub card_code: String,
    #[serde(default)]
    pub image_name: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub display_name: String,
    pub box_name: String,
    pub card_code: String,
    pub image_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CardChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<Option<String>>,
}

/// One entry of a bulk card import file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CardImport {
    pub box_name: String,
    pub display_name: String,
    pub card_code: String,
    #[serde(default)]
    pub image_filename: Option<String>,
}

impl From<CardImport> for NewCard {
    fn from(item: CardImport) -> Self {
        NewCard {
            display_name: item.display_name,
            box_name: item.box_name,
            card_code: item.card_code,
            image_name: item.image_filename.filter(|name| !name.is_empty()),
        }
    }
}

impl Record for Card {
    type New = NewCard;
    type Changes = CardChanges;

    const RELATION: &'static str = "cards";
    const KEY: &'static str = "card_id";
    const LABEL: &'static str = "card";

    fn key(&self) -> &str {
        &self.card_id
    }

    fn owner(&self) -> &str {
        &self.user_id
    }

    fn validate_new(new: &NewCard) -> AppResult<()> {
        require_text("display_name", &new.display_name)?;
        require_text("box_name", &new.box_name)?;
        require_text("card_code", &new.card_code)
    }

    fn validate_changes(changes: &CardChanges) -> AppResult<()> {
        let required = [
            ("display_name", &changes.display_name),
            ("box_name", &changes.box_name),
            ("card_code", &changes.card_code),
        ];
        for (field, value) in required {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }
        Ok(())
    }
}
