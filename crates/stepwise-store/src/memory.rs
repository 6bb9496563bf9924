//! In-memory ledger backend.

use chrono::Utc;
use stepwise_migrate::{LedgerEntry, LedgerStore, StoreError, UnitOfWork};

/// Runs an effect against whatever the in-memory ledger stands in front of.
pub type Executor = Box<dyn FnMut(&str) -> Result<(), String> + Send>;

/// In-memory ledger.
///
/// Nothing touches disk. Effects are recorded in [`effects`] and, when an
/// executor is installed, handed to it as well. Only the ledger and the
/// effect log are rolled back on an uncommitted unit; anything the executor
/// did is its own business.
///
/// [`effects`]: MemoryLedger::effects
///
/// # Example
///
/// ```
/// use stepwise_migrate::{LedgerStore, UnitOfWork};
/// use stepwise_store::MemoryLedger;
///
/// let mut ledger = MemoryLedger::new();
/// let mut unit = ledger.begin().unwrap();
/// unit.execute("CREATE TABLE t (id INTEGER);").unwrap();
/// unit.append("20240101000000-init.sql").unwrap();
/// unit.commit().unwrap();
///
/// assert_eq!(ledger.entries().unwrap().len(), 1);
/// assert_eq!(ledger.effects(), ["CREATE TABLE t (id INTEGER);"]);
/// ```
pub struct MemoryLedger {
    entries: Vec<LedgerEntry>,
    effects: Vec<String>,
    next_sequence: i64,
    executor: Option<Executor>,
    fail_next_commit: bool,
}

impl MemoryLedger {
    /// Create a new empty ledger that accepts every effect.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            effects: Vec::new(),
            next_sequence: 1,
            executor: None,
            fail_next_commit: false,
        }
    }

    /// Route effects through `executor`. An `Err` makes `execute` fail.
    pub fn with_executor<F>(mut self, executor: F) -> Self
    where
        F: FnMut(&str) -> Result<(), String> + Send + 'static,
    {
        self.executor = Some(Box::new(executor));
        self
    }

    /// Make the next commit fail, leaving the unit uncommitted.
    pub fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    /// Effects from committed units, oldest first.
    pub fn effects(&self) -> &[String] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryLedger {
    type Unit<'a> = MemoryUnit<'a>;

    fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.entries.clone())
    }

    fn begin(&mut self) -> Result<MemoryUnit<'_>, StoreError> {
        Ok(MemoryUnit {
            entries: self.entries.clone(),
            effects: Vec::new(),
            next_sequence: self.next_sequence,
            ledger: self,
        })
    }
}

/// Staged changes against a [`MemoryLedger`]. Discarded on drop.
pub struct MemoryUnit<'a> {
    ledger: &'a mut MemoryLedger,
    entries: Vec<LedgerEntry>,
    effects: Vec<String>,
    next_sequence: i64,
}

impl UnitOfWork for MemoryUnit<'_> {
    fn execute(&mut self, effect: &str) -> Result<(), StoreError> {
        if let Some(executor) = self.ledger.executor.as_mut() {
            executor(effect).map_err(StoreError::backend)?;
        }
        self.effects.push(effect.to_string());
        Ok(())
    }

    fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(StoreError::DuplicateName {
                name: name.to_string(),
            });
        }
        let entry = LedgerEntry {
            sequence_id: self.next_sequence,
            applied_at: Utc::now(),
            name: name.to_string(),
        };
        self.next_sequence += 1;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .iter()
            .max_by_key(|e| (e.applied_at, e.sequence_id))
            .cloned())
    }

    fn remove(&mut self, sequence_id: i64) -> Result<(), StoreError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.sequence_id != sequence_id);
        if self.entries.len() == before {
            return Err(StoreError::backend(format!(
                "no ledger entry with id {sequence_id}"
            )));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.ledger.fail_next_commit {
            self.ledger.fail_next_commit = false;
            return Err(StoreError::backend("commit refused"));
        }
        self.ledger.entries = self.entries;
        self.ledger.effects.extend(self.effects);
        self.ledger.next_sequence = self.next_sequence;
        Ok(())
    }
}
