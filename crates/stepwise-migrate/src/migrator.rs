//! Reconcile-then-apply orchestration over one source and one ledger.

use tracing::{debug, info};

use crate::apply::{self, AppliedMigration, RevertedMigration};
use crate::definition::MigrationDefinition;
use crate::error::{MigrationError, Result};
use crate::ledger::LedgerStore;
use crate::reconcile::{self, Reconciliation};
use crate::source::{DefinitionProvider, MigrationSource};

/// Summary of an `up` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpReport {
    /// Migrations applied by this run, in order.
    pub applied: Vec<AppliedMigration>,
    /// Ledger length before the run.
    pub previously_applied: usize,
    /// Most recent migration after the run.
    pub latest: Option<String>,
}

impl UpReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Drives reconciliation and the applier for one source and one ledger.
///
/// Every public operation reconciles from scratch first; nothing read from
/// the source or the ledger is kept between calls.
///
/// # Example
///
/// ```
/// use stepwise_migrate::{Migrator, MigrationSource, StaticProvider, SEPARATOR};
/// # use stepwise_migrate::{LedgerStore, LedgerEntry, StoreError, UnitOfWork};
/// # #[derive(Default)] struct Ledger(Vec<LedgerEntry>);
/// # struct Unit<'a>(&'a mut Ledger, Vec<LedgerEntry>);
/// # impl LedgerStore for Ledger {
/// #     type Unit<'a> = Unit<'a>;
/// #     fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError> { Ok(self.0.clone()) }
/// #     fn begin(&mut self) -> Result<Unit<'_>, StoreError> { let s = self.0.clone(); Ok(Unit(self, s)) }
/// # }
/// # impl UnitOfWork for Unit<'_> {
/// #     fn execute(&mut self, _: &str) -> Result<(), StoreError> { Ok(()) }
/// #     fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError> {
/// #         let e = LedgerEntry { sequence_id: self.1.len() as i64 + 1, applied_at: chrono::Utc::now(), name: name.into() };
/// #         self.1.push(e.clone()); Ok(e)
/// #     }
/// #     fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError> { Ok(self.1.last().cloned()) }
/// #     fn remove(&mut self, id: i64) -> Result<(), StoreError> { self.1.retain(|e| e.sequence_id != id); Ok(()) }
/// #     fn commit(self) -> Result<(), StoreError> { self.0.0 = self.1; Ok(()) }
/// # }
///
/// let mut provider = StaticProvider::default();
/// provider.push(
///     "20240101000000-init",
///     format!("CREATE TABLE t (id INTEGER);{SEPARATOR}DROP TABLE t;"),
/// );
///
/// let mut migrator = Migrator::new(MigrationSource::new(provider), Ledger::default());
/// let report = migrator.up().unwrap();
/// assert_eq!(report.applied.len(), 1);
///
/// let reverted = migrator.down().unwrap().unwrap();
/// assert_eq!(reverted.name, "20240101000000-init");
/// assert!(migrator.down().unwrap().is_none());
/// ```
pub struct Migrator<P, S> {
    source: MigrationSource<P>,
    store: S,
}

impl<P: DefinitionProvider, S: LedgerStore> Migrator<P, S> {
    pub fn new(source: MigrationSource<P>, store: S) -> Self {
        Self { source, store }
    }

    pub fn source(&self) -> &MigrationSource<P> {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Validate every definition, read the ledger and check that it is a
    /// prefix of the canonical order.
    pub fn reconcile(&mut self) -> Result<Reconciliation> {
        let canonical = self.source.list()?;
        if canonical.is_empty() {
            return Err(MigrationError::NoDefinitionsFound {
                location: self.source.location(),
            });
        }

        let applied = self
            .store
            .entries()
            .map_err(|source| MigrationError::LedgerReadFailed { source })?;

        let reconciliation = reconcile::check_prefix(canonical, applied)?;
        debug!(
            applied = reconciliation.applied().len(),
            pending = reconciliation.pending().len(),
            "ledger reconciled"
        );
        Ok(reconciliation)
    }

    /// Apply one definition in its own transaction.
    pub fn apply_forward(&mut self, definition: &MigrationDefinition) -> Result<AppliedMigration> {
        apply::apply_forward(&mut self.store, definition)
    }

    /// Revert the newest ledger entry, which must be `expected`.
    pub fn revert_most_recent(
        &mut self,
        expected: &MigrationDefinition,
    ) -> Result<RevertedMigration> {
        apply::revert_most_recent(&mut self.store, expected)
    }

    /// Apply every pending migration, one transaction each.
    pub fn up(&mut self) -> Result<UpReport> {
        self.up_with(|_| {})
    }

    /// Like [`up`](Self::up), calling `on_applied` after each commit.
    ///
    /// Stops at the first failure; migrations applied before it stay applied.
    pub fn up_with<F>(&mut self, mut on_applied: F) -> Result<UpReport>
    where
        F: FnMut(&AppliedMigration),
    {
        let reconciliation = self.reconcile()?;
        let mut report = UpReport {
            previously_applied: reconciliation.applied().len(),
            latest: reconciliation.latest().map(|e| e.name.clone()),
            ..UpReport::default()
        };

        for definition in reconciliation.pending() {
            let applied = self.apply_forward(definition)?;
            on_applied(&applied);
            report.latest = Some(applied.name.clone());
            report.applied.push(applied);
        }

        if report.is_noop() {
            info!(applied = report.previously_applied, "database already up to date");
        }
        Ok(report)
    }

    /// Revert exactly one migration. `None` when nothing is applied.
    pub fn down(&mut self) -> Result<Option<RevertedMigration>> {
        let reconciliation = self.reconcile()?;
        match reconciliation.revert_target() {
            Some((_, definition)) => self.revert_most_recent(definition).map(Some),
            None => Ok(None),
        }
    }

    /// Revert everything, newest first.
    pub fn destroy(&mut self) -> Result<Vec<RevertedMigration>> {
        self.destroy_with(|_| {})
    }

    /// Like [`destroy`](Self::destroy), calling `on_reverted` after each
    /// commit. Each step reconciles again and stops at the first failure.
    pub fn destroy_with<F>(&mut self, mut on_reverted: F) -> Result<Vec<RevertedMigration>>
    where
        F: FnMut(&RevertedMigration),
    {
        let mut reverted = Vec::new();
        while let Some(step) = self.down()? {
            on_reverted(&step);
            reverted.push(step);
        }
        Ok(reverted)
    }
}
