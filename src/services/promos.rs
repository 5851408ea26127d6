use super::scoped::ScopedCollection;
use crate::models::Promo;

/// Owner-scoped promos, newest first.
pub type Promos = ScopedCollection<Promo>;
