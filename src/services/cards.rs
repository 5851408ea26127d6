use super::scoped::ScopedCollection;
use crate::{
    error::AppError,
    models::{Card, CardImport, NewCard},
};

pub type Cards = ScopedCollection<Card>;

impl ScopedCollection<Card> {
    /// Inserts a batch of imported cards in one call. The inserted cards
    /// are placed ahead of the existing list.
    pub async fn import(&self, items: Vec<CardImport>) -> Option<Vec<Card>> {
        tracing::debug!("Importing {} cards", items.len());
        let batch: Vec<NewCard> = items.into_iter().map(NewCard::from).collect();
        self.add_many(batch).await
    }

    /// Parses a JSON array of import entries and imports them.
    pub async fn import_json(&self, text: &str) -> Option<Vec<Card>> {
        match serde_json::from_str::<Vec<CardImport>>(text) {
            Ok(items) => self.import(items).await,
            Err(e) => {
                let ticket = self.begin();
                let err = AppError::Validation(format!("Invalid card import file: {}", e));
                self.settle(ticket, "import", Err::<Vec<Card>, _>(err))
            }
        }
    }
}
