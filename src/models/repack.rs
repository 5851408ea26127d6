use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    require_count, require_price, require_text, serialize_cents, serialize_cents_opt, Promo,
    Record,
};
use crate::{
    error::{AppError, AppResult},
    storage::Row,
};

/// Free-form status label of a repack.
///
/// Any non-blank label is accepted; [`RepackStatus::RECOMMENDED`] lists the
/// labels the app offers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepackStatus(String);

impl RepackStatus {
    pub const AVAILABLE: &'static str = "available";
    pub const SOLD: &'static str = "sold";
    pub const DRAFT: &'static str = "draft";
    pub const RECOMMENDED: [&'static str; 3] = [Self::AVAILABLE, Self::SOLD, Self::DRAFT];

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn available() -> Self {
        Self::new(Self::AVAILABLE)
    }

    pub fn sold() -> Self {
        Self::new(Self::SOLD)
    }

    pub fn draft() -> Self {
        Self::new(Self::DRAFT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_recommended(&self) -> bool {
        Self::RECOMMENDED.iter().any(|label| *label == self.0)
    }

    pub fn validate(&self) -> AppResult<()> {
        require_text("status", &self.0)
    }
}

impl fmt::Display for RepackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repack {
    pub repacks_id: String,
    pub title: String,
    pub date: NaiveDate,
    /// Number of slots the repack is split into.
    pub quantity: i32,
    pub price: f64,
    pub status: RepackStatus,
    pub inserted_at: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepack {
    pub title: String,
    pub date: NaiveDate,
    pub quantity: i32,
    #[serde(serialize_with = "serialize_cents")]
    pub price: f64,
    pub status: RepackStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepackChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_cents_opt"
    )]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RepackStatus>,
}

impl Record for Repack {
    type New = NewRepack;
    type Changes = RepackChanges;

    const RELATION: &'static str = "repacks";
    const KEY: &'static str = "repacks_id";
    const LABEL: &'static str = "repack";

    fn key(&self) -> &str {
        &self.repacks_id
    }

    fn owner(&self) -> &str {
        &self.user_id
    }

    fn validate_new(new: &NewRepack) -> AppResult<()> {
        require_text("title", &new.title)?;
        require_count("quantity", new.quantity)?;
        require_price(new.price)?;
        new.status.validate()
    }

    fn validate_changes(changes: &RepackChanges) -> AppResult<()> {
        if let Some(title) = &changes.title {
            require_text("title", title)?;
        }
        if let Some(quantity) = changes.quantity {
            require_count("quantity", quantity)?;
        }
        if let Some(price) = changes.price {
            require_price(price)?;
        }
        if let Some(status) = &changes.status {
            status.validate()?;
        }
        Ok(())
    }
}

/// Row of the join relation linking a repack to a promo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepackPromo {
    pub repack_id: String,
    pub promo_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<DateTime<Utc>>,
}

impl RepackPromo {
    pub const RELATION: &'static str = "repack_promo";
    pub const CONFLICT: [&'static str; 2] = ["repack_id", "promo_id"];

    pub fn link(repack_id: &str, promo_id: &str, user_id: &str) -> Self {
        Self {
            repack_id: repack_id.to_string(),
            promo_id: promo_id.to_string(),
            user_id: user_id.to_string(),
            inserted_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepackWithPromos {
    #[serde(flatten)]
    pub repack: Repack,
    pub associated_promos: Vec<Promo>,
}

/// A join row as embedded under its repack; `promo` is null when the
/// linked promo is gone or not visible.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromoLink {
    #[serde(default)]
    pub promo: Option<Promo>,
}

/// A repack read together with its embedded join rows, before flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct RepackJoin {
    pub repack: Repack,
    pub links: Vec<PromoLink>,
}

impl RepackJoin {
    /// Splits an embedded-select row into the repack columns and the join
    /// rows stored under `RepackPromo::RELATION`.
    pub fn from_row(mut row: Row) -> AppResult<Self> {
        let links = match row.remove(RepackPromo::RELATION) {
            Some(Value::Null) | None => Vec::new(),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                AppError::Remote(format!("Malformed {} rows: {}", RepackPromo::RELATION, e))
            })?,
        };
        let repack = serde_json::from_value(Value::Object(row))
            .map_err(|e| AppError::Remote(format!("Malformed repack row: {}", e)))?;
        Ok(Self { repack, links })
    }

    /// Drops empty links and repeated promos, keeping first occurrences.
    pub fn flatten(self) -> RepackWithPromos {
        let mut seen = HashSet::new();
        let associated_promos = self
            .links
            .into_iter()
            .filter_map(|link| link.promo)
            .filter(|promo| seen.insert(promo.promo_id.clone()))
            .collect();

        RepackWithPromos {
            repack: self.repack,
            associated_promos,
        }
    }
}
