pub mod card;
pub mod player;
pub mod player_mop;
pub mod promo;
pub mod repack;

pub use card::*;
pub use player::*;
pub use player_mop::*;
pub use promo::*;
pub use repack::*;

use serde::{de::DeserializeOwned, Serialize, Serializer};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Binds a persisted entity to its relation.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Insert payload supplied by callers, without generated fields.
    type New: Serialize + Send + Sync;
    /// Partial update payload; absent fields are left untouched.
    type Changes: Serialize + Send + Sync;

    const RELATION: &'static str;
    /// Column holding the client-generated identifier.
    const KEY: &'static str;
    /// Human name used in log lines and error messages.
    const LABEL: &'static str;
    const OWNER_COLUMN: Option<&'static str> = Some("user_id");
    const ORDER_BY: &'static str = "inserted_at";
    const ASCENDING: bool = false;
    /// Field whose value must not repeat within the owner's records.
    const UNIQUE_FIELD: Option<&'static str> = None;

    fn key(&self) -> &str;

    fn owner(&self) -> &str;

    fn field(&self, name: &str) -> Option<Value> {
        serde_json::to_value(self)
            .ok()
            .and_then(|value| value.get(name).cloned())
    }

    fn validate_new(_new: &Self::New) -> AppResult<()> {
        Ok(())
    }

    fn validate_changes(_changes: &Self::Changes) -> AppResult<()> {
        Ok(())
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

pub(crate) fn require_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(format!(
            "price must be a non-negative amount, got {}",
            price
        )));
    }
    Ok(())
}

pub(crate) fn require_count(field: &str, value: i32) -> AppResult<()> {
    if value < 0 {
        return Err(AppError::Validation(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }
    Ok(())
}

pub(crate) fn to_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

pub(crate) fn serialize_cents<S: Serializer>(price: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(to_cents(*price))
}

pub(crate) fn serialize_cents_opt<S: Serializer>(
    price: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match price {
        Some(price) => serializer.serialize_f64(to_cents(*price)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_round_to_two_decimals() {
        assert_eq!(to_cents(9.999), 10.0);
        assert_eq!(to_cents(9.994), 9.99);
        assert_eq!(to_cents(0.0), 0.0);
    }

    #[test]
    fn negative_and_nan_prices_are_rejected() {
        assert!(require_price(0.0).is_ok());
        assert!(require_price(-0.01).is_err());
        assert!(require_price(f64::NAN).is_err());
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(require_text("name", "Alex").is_ok());
        assert_eq!(
            require_text("name", "   "),
            Err(AppError::Validation("name must not be empty".to_string()))
        );
    }
}
