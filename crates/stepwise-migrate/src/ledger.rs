//! The applied-migration ledger and the unit of work that mutates it.
//!
//! Backends live in `stepwise-store`. Everything here is the contract the
//! reconciler and applier rely on.

use std::error::Error;

use chrono::{DateTime, Utc};

/// One row of the ledger: a migration that has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedgerEntry {
    /// Assigned by the store, strictly increasing.
    pub sequence_id: i64,
    /// When the entry was written.
    pub applied_at: DateTime<Utc>,
    /// Name of the applied migration definition.
    pub name: String,
}

/// Error from a ledger backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The name column already holds this value.
    #[error("ledger already contains {name}")]
    DuplicateName { name: String },
    /// `remove_most_recent` found nothing to remove.
    #[error("ledger is empty")]
    EmptyLedger,
    /// Anything the backend itself reports.
    #[error(transparent)]
    Backend(Box<dyn Error + Send + Sync + 'static>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::Backend(err.into())
    }
}

/// A durable, transactional ledger.
///
/// All mutation goes through a [`UnitOfWork`] obtained from [`begin`].
///
/// [`begin`]: LedgerStore::begin
pub trait LedgerStore {
    /// Open transaction against this store.
    type Unit<'a>: UnitOfWork
    where
        Self: 'a;

    /// All entries, ascending by `sequence_id`.
    fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Start a unit of work. Only one may be open at a time.
    fn begin(&mut self) -> Result<Self::Unit<'_>, StoreError>;
}

/// One atomic transaction: a migration effect plus its ledger bookkeeping.
///
/// Dropping a unit without calling [`commit`](UnitOfWork::commit) rolls back
/// everything done through it, so every early return is a rollback.
pub trait UnitOfWork {
    /// Run an opaque migration effect.
    fn execute(&mut self, effect: &str) -> Result<(), StoreError>;

    /// Record `name` as applied. Fails with [`StoreError::DuplicateName`] if
    /// it is already recorded.
    fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError>;

    /// The newest entry by `applied_at`, ties broken by `sequence_id`.
    fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError>;

    /// Delete the entry with this sequence id.
    fn remove(&mut self, sequence_id: i64) -> Result<(), StoreError>;

    /// Delete and return the newest entry.
    fn remove_most_recent(&mut self) -> Result<LedgerEntry, StoreError> {
        let entry = self.latest()?.ok_or(StoreError::EmptyLedger)?;
        self.remove(entry.sequence_id)?;
        Ok(entry)
    }

    /// Make the unit durable.
    fn commit(self) -> Result<(), StoreError>;
}
