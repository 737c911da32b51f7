//! The data access seam the board controller writes through.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::grouping::FieldChanges;
use super::Card;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error(".rangeboard directory not found (walk up from {0})")]
    NotFound(PathBuf),
    #[error("invalid card file {path}: {reason}")]
    InvalidCard { path: PathBuf, reason: String },
    #[error("card {0:?} does not exist")]
    MissingCard(String),
    #[error("store rejected the write: {0}")]
    Rejected(String),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// New position for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrderUpdate {
    pub id: String,
    pub sort_order: i64,
}

impl SortOrderUpdate {
    pub fn new(id: impl Into<String>, sort_order: i64) -> Self {
        Self {
            id: id.into(),
            sort_order,
        }
    }
}

/// Backing store for board cards.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Partially update a single card; returns the stored card.
    async fn update_entity_field(&self, id: &str, changes: &FieldChanges) -> Result<Card, StoreError>;

    /// Write new positions for several cards.
    async fn batch_update_sort_order(&self, updates: &[SortOrderUpdate]) -> Result<(), StoreError>;

    /// Fetch the full collection for the store's board.
    async fn reload(&self) -> Result<Vec<Card>, StoreError>;
}

/// A [`CardStore`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cards: Mutex<Vec<Card>>,
}

impl MemoryStore {
    pub fn new(cards: Vec<Card>) -> Self {
        Self {
            cards: Mutex::new(cards),
        }
    }

    pub fn snapshot(&self) -> Vec<Card> {
        self.lock().clone()
    }

    /// Replace the stored collection, as another client's writes would.
    pub fn replace(&self, cards: Vec<Card>) {
        *self.lock() = cards;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Card>> {
        self.cards.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn update_entity_field(&self, id: &str, changes: &FieldChanges) -> Result<Card, StoreError> {
        let mut cards = self.lock();
        let card = cards
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::MissingCard(id.to_string()))?;
        changes.apply(card);
        card.touch();
        Ok(card.clone())
    }

    async fn batch_update_sort_order(&self, updates: &[SortOrderUpdate]) -> Result<(), StoreError> {
        let mut cards = self.lock();
        // Validate every id before writing anything
        if let Some(missing) = updates.iter().find(|u| !cards.iter().any(|c| c.id == u.id)) {
            return Err(StoreError::MissingCard(missing.id.clone()));
        }
        for update in updates {
            if let Some(card) = cards.iter_mut().find(|c| c.id == update.id) {
                card.sort_order = update.sort_order;
                card.touch();
            }
        }
        Ok(())
    }

    async fn reload(&self) -> Result<Vec<Card>, StoreError> {
        Ok(self.snapshot())
    }
}
