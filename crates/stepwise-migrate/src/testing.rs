//! In-crate fake ledger with failure injection, for unit tests.

use chrono::{TimeZone, Utc};

use crate::ledger::{LedgerEntry, LedgerStore, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeState {
    pub entries: Vec<LedgerEntry>,
    pub effects: Vec<String>,
    pub next_sequence: i64,
}

#[derive(Debug, Default)]
pub(crate) struct FakeLedger {
    pub state: FakeState,
    /// Effects containing this text fail.
    pub fail_effect: Option<String>,
    pub fail_append: bool,
    pub fail_remove: bool,
    pub fail_commit: bool,
    pub begins: usize,
    pub commits: usize,
}

impl FakeLedger {
    pub fn with_applied(names: &[&str]) -> Self {
        let mut ledger = Self::default();
        for name in names {
            ledger.push(name);
        }
        ledger
    }

    /// Write an entry directly, bypassing any unit of work.
    pub fn push(&mut self, name: &str) {
        let state = &mut self.state;
        state.next_sequence += 1;
        state.entries.push(LedgerEntry {
            sequence_id: state.next_sequence,
            applied_at: Utc.timestamp_opt(1_700_000_000 + state.next_sequence, 0).unwrap(),
            name: name.to_string(),
        });
    }

    pub fn names(&self) -> Vec<String> {
        self.state.entries.iter().map(|e| e.name.clone()).collect()
    }
}

pub(crate) struct FakeUnit<'a> {
    ledger: &'a mut FakeLedger,
    staged: FakeState,
}

impl LedgerStore for FakeLedger {
    type Unit<'a> = FakeUnit<'a>;

    fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.state.entries.clone())
    }

    fn begin(&mut self) -> Result<FakeUnit<'_>, StoreError> {
        self.begins += 1;
        let staged = self.state.clone();
        Ok(FakeUnit {
            ledger: self,
            staged,
        })
    }
}

impl UnitOfWork for FakeUnit<'_> {
    fn execute(&mut self, effect: &str) -> Result<(), StoreError> {
        if let Some(pattern) = &self.ledger.fail_effect {
            if effect.contains(pattern.as_str()) {
                return Err(StoreError::backend(format!("effect rejected: {effect}")));
            }
        }
        self.staged.effects.push(effect.to_string());
        Ok(())
    }

    fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError> {
        if self.ledger.fail_append {
            return Err(StoreError::backend("append rejected"));
        }
        if self.staged.entries.iter().any(|e| e.name == name) {
            return Err(StoreError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.staged.next_sequence += 1;
        let entry = LedgerEntry {
            sequence_id: self.staged.next_sequence,
            applied_at: Utc
                .timestamp_opt(1_700_000_000 + self.staged.next_sequence, 0)
                .unwrap(),
            name: name.to_string(),
        };
        self.staged.entries.push(entry.clone());
        Ok(entry)
    }

    fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .staged
            .entries
            .iter()
            .max_by_key(|e| (e.applied_at, e.sequence_id))
            .cloned())
    }

    fn remove(&mut self, sequence_id: i64) -> Result<(), StoreError> {
        if self.ledger.fail_remove {
            return Err(StoreError::backend("remove rejected"));
        }
        self.staged.entries.retain(|e| e.sequence_id != sequence_id);
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.ledger.fail_commit {
            return Err(StoreError::backend("commit rejected"));
        }
        self.ledger.commits += 1;
        self.ledger.state = self.staged;
        Ok(())
    }
}
