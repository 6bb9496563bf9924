//! Checks the ledger against the canonical order and derives the work left.

use crate::definition::MigrationDefinition;
use crate::error::{MigrationError, Result};
use crate::ledger::LedgerEntry;

/// Outcome of a successful reconciliation.
///
/// Holds a snapshot of both orders. It goes stale as soon as anything is
/// applied or reverted, so reconcile again before the next operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    canonical: Vec<MigrationDefinition>,
    applied: Vec<LedgerEntry>,
}

impl Reconciliation {
    pub fn canonical(&self) -> &[MigrationDefinition] {
        &self.canonical
    }

    pub fn applied(&self) -> &[LedgerEntry] {
        &self.applied
    }

    /// Definitions not yet applied, in the order they must run.
    pub fn pending(&self) -> &[MigrationDefinition] {
        &self.canonical[self.applied.len()..]
    }

    pub fn is_up_to_date(&self) -> bool {
        self.applied.len() == self.canonical.len()
    }

    /// The most recently applied entry.
    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.applied.last()
    }

    /// The entry a single revert would remove, with its definition.
    pub fn revert_target(&self) -> Option<(&LedgerEntry, &MigrationDefinition)> {
        let entry = self.applied.last()?;
        Some((entry, &self.canonical[self.applied.len() - 1]))
    }

    pub fn into_parts(self) -> (Vec<MigrationDefinition>, Vec<LedgerEntry>) {
        (self.canonical, self.applied)
    }
}

/// Verify that `applied` is an in-order prefix of `canonical`.
pub fn check_prefix(
    canonical: Vec<MigrationDefinition>,
    applied: Vec<LedgerEntry>,
) -> Result<Reconciliation> {
    if applied.len() > canonical.len() {
        return Err(MigrationError::LedgerAheadOfSource {
            applied: applied.len(),
            available: canonical.len(),
        });
    }

    if let Some((index, (entry, definition))) = applied
        .iter()
        .zip(&canonical)
        .enumerate()
        .find(|(_, (entry, definition))| entry.name != definition.name())
    {
        return Err(MigrationError::LedgerDivergesFromSource {
            index,
            applied: entry.name.clone(),
            expected: definition.name().to_string(),
        });
    }

    Ok(Reconciliation { canonical, applied })
}
