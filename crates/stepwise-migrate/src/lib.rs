//! # stepwise-migrate
//!
//! Ordered, reversible SQL migrations tracked in a database ledger.
//!
//! The ledger records every migration applied to a database. This crate
//! keeps it consistent with the migration definitions on disk and applies
//! or reverts them one transaction at a time.
//!
//! ## How It Works
//!
//! 1. A [`MigrationSource`] lists every definition, sorted by its
//!    [`MigrationKey`] (the `YYYYMMDDHHMMSS` prefix of its name). All of them
//!    are parsed up front; one malformed file stops everything.
//! 2. The reconciler checks that the ledger is an exact prefix of that
//!    order. Anything else (a missing file, a gap, a reordering) is fatal.
//! 3. The applier runs each pending migration inside its own
//!    [`UnitOfWork`], together with the ledger insert. A revert re-reads the
//!    newest entry inside the transaction before touching anything.
//!
//! ## Key Concepts
//!
//! - **Linear history**: migrations run in canonical order, never skipping.
//! - **One unit per migration**: a failed effect, ledger write or commit
//!   rolls back that migration only, and the run stops there.
//! - **Opaque effects**: SQL bodies are handed to the store untouched.
//!
//! Storage backends live in `stepwise-store`.

mod apply;
mod definition;
mod error;
mod ledger;
mod migrator;
mod reconcile;
mod source;
#[cfg(test)]
mod testing;

pub use apply::{apply_forward, revert_most_recent, AppliedMigration, RevertedMigration};
pub use definition::{
    MigrationDefinition, MigrationKey, RawDefinition, EXTENSION, SEPARATOR, TIMESTAMP_WIDTH,
};
pub use error::{ErrorKind, MalformedReason, MigrationError, Result};
pub use ledger::{LedgerEntry, LedgerStore, StoreError, UnitOfWork};
pub use migrator::{Migrator, UpReport};
pub use reconcile::{check_prefix, Reconciliation};
pub use source::{DefinitionProvider, DirectoryProvider, MigrationSource, StaticProvider};
