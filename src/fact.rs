//! Fact records read from the external Fact Store.
//!
//! Facts (dated decisions attributed to an entity) are written by the
//! ingestion pipeline. This crate only reads them, during aggregate rebuilds.

use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::storage::StorageError;

/// One immutable, dated event attributed to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Entity the event is attributed to.
    pub entity_id: EntityId,
    /// Date the event happened (e.g. date a decision was filed).
    pub event_date: NaiveDate,
    /// Optional outcome or category label.
    pub category: Option<String>,
}

impl FactRecord {
    /// Create a fact without a category.
    #[must_use]
    pub const fn new(entity_id: EntityId, event_date: NaiveDate) -> Self {
        Self {
            entity_id,
            event_date,
            category: None,
        }
    }

    /// Attach a category label.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Read-only view of the Fact Store.
pub trait FactSource: Send + Sync {
    /// Return every fact whose `event_date` lies in `[from, to]` (inclusive).
    ///
    /// # Errors
    ///
    /// Any backend failure. A failing scan aborts the rebuild that issued it.
    fn facts_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<FactRecord>, StorageError>;
}

/// Append-only in-memory fact store, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    facts: RwLock<Vec<FactRecord>>,
}

impl InMemoryFactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fact.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn append(&self, fact: FactRecord) -> Result<(), StorageError> {
        let mut facts = self
            .facts
            .write()
            .map_err(|_| StorageError::BackendError("poisoned lock: fact.append".to_string()))?;
        facts.push(fact);
        Ok(())
    }

    /// Append many facts.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn extend(&self, batch: impl IntoIterator<Item = FactRecord>) -> Result<(), StorageError> {
        let mut facts = self
            .facts
            .write()
            .map_err(|_| StorageError::BackendError("poisoned lock: fact.extend".to_string()))?;
        facts.extend(batch);
        Ok(())
    }

    /// Number of stored facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.read().map(|f| f.len()).unwrap_or(0)
    }

    /// Returns true if no fact has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FactSource for InMemoryFactStore {
    fn facts_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<FactRecord>, StorageError> {
        let facts = self
            .facts
            .read()
            .map_err(|_| StorageError::BackendError("poisoned lock: fact.scan".to_string()))?;
        Ok(facts
            .iter()
            .filter(|f| f.event_date >= from && f.event_date <= to)
            .cloned()
            .collect())
    }
}
