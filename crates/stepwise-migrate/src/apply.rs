//! Runs one migration and its ledger bookkeeping as a single transaction.
//!
//! Each function opens exactly one unit of work. Any early return drops the
//! unit, which rolls it back, so an effect is never left without its ledger
//! record and vice versa.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::definition::MigrationDefinition;
use crate::error::{MigrationError, Result};
use crate::ledger::{LedgerStore, StoreError, UnitOfWork};

/// A forward migration that has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedMigration {
    pub name: String,
    pub sequence_id: i64,
    pub applied_at: DateTime<Utc>,
}

/// A backward migration that has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RevertedMigration {
    pub name: String,
    pub sequence_id: i64,
}

/// Execute `definition`'s forward effect and record it in the ledger.
pub fn apply_forward<S: LedgerStore>(
    store: &mut S,
    definition: &MigrationDefinition,
) -> Result<AppliedMigration> {
    let name = definition.name();
    let mut unit = store
        .begin()
        .map_err(|source| MigrationError::TransactionBeginFailed {
            name: name.to_string(),
            source,
        })?;
    debug!(migration = name, "forward unit started");

    if let Err(source) = unit.execute(definition.forward()) {
        error!(migration = name, error = %source, "forward migration failed, rolling back");
        return Err(MigrationError::EffectExecutionFailed {
            name: name.to_string(),
            effect: definition.forward().to_string(),
            source,
        });
    }

    let entry = unit.append(name).map_err(|source| {
        warn!(migration = name, error = %source, "ledger append failed, rolling back");
        match source {
            StoreError::DuplicateName { name } => MigrationError::DuplicateName { name },
            source => MigrationError::LedgerWriteFailed {
                name: name.to_string(),
                source,
            },
        }
    })?;

    unit.commit()
        .map_err(|source| MigrationError::CommitFailed {
            name: name.to_string(),
            source,
        })?;

    info!(migration = name, sequence_id = entry.sequence_id, "applied migration");
    Ok(AppliedMigration {
        name: entry.name,
        sequence_id: entry.sequence_id,
        applied_at: entry.applied_at,
    })
}

/// Run `expected`'s backward effect and delete its ledger entry.
///
/// The newest entry is re-read inside the transaction; if it is not
/// `expected` the ledger changed since it was reconciled and nothing is done.
pub fn revert_most_recent<S: LedgerStore>(
    store: &mut S,
    expected: &MigrationDefinition,
) -> Result<RevertedMigration> {
    let name = expected.name();
    let mut unit = store
        .begin()
        .map_err(|source| MigrationError::TransactionBeginFailed {
            name: name.to_string(),
            source,
        })?;
    debug!(migration = name, "backward unit started");

    let latest = unit
        .latest()
        .map_err(|source| MigrationError::LedgerReadFailed { source })?
        .ok_or(MigrationError::EmptyLedger)?;
    if latest.name != name {
        warn!(expected = name, found = %latest.name, "revert target changed, rolling back");
        return Err(MigrationError::RevertTargetMismatch {
            expected: name.to_string(),
            found: latest.name,
        });
    }

    if let Err(source) = unit.execute(expected.backward()) {
        error!(migration = name, error = %source, "backward migration failed, rolling back");
        return Err(MigrationError::EffectExecutionFailed {
            name: name.to_string(),
            effect: expected.backward().to_string(),
            source,
        });
    }

    unit.remove(latest.sequence_id)
        .map_err(|source| MigrationError::LedgerWriteFailed {
            name: name.to_string(),
            source,
        })?;

    unit.commit()
        .map_err(|source| MigrationError::CommitFailed {
            name: name.to_string(),
            source,
        })?;

    info!(migration = name, sequence_id = latest.sequence_id, "reverted migration");
    Ok(RevertedMigration {
        name: latest.name,
        sequence_id: latest.sequence_id,
    })
}
