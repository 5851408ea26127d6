use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{require_count, require_price, require_text, serialize_cents, serialize_cents_opt, Record};
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promo {
    pub promo_id: String,
    pub title: String,
    pub qty: i32,
    #[serde(default)]
    pub free: Option<String>,
    pub price: f64,
    pub inserted_at: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPromo {
    pub title: String,
    pub qty: i32,
    pub free: Option<String>,
    #[serde(serialize_with = "serialize_cents")]
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromoChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free: Option<Option<String>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_cents_opt"
    )]
    pub price: Option<f64>,
}

impl Record for Promo {
    type New = NewPromo;
    type Changes = PromoChanges;

    const RELATION: &'static str = "promo";
    const KEY: &'static str = "promo_id";
    const LABEL: &'static str = "promo";

    fn key(&self) -> &str {
        &self.promo_id
    }

    fn owner(&self) -> &str {
        &self.user_id
    }

    fn validate_new(new: &NewPromo) -> AppResult<()> {
        require_text("title", &new.title)?;
        require_count("qty", new.qty)?;
        require_price(new.price)
    }

    fn validate_changes(changes: &PromoChanges) -> AppResult<()> {
        if let Some(title) = &changes.title {
            require_text("title", title)?;
        }
        if let Some(qty) = changes.qty {
            require_count("qty", qty)?;
        }
        if let Some(price) = changes.price {
            require_price(price)?;
        }
        Ok(())
    }
}
