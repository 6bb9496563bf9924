//! Runtime dispatch over the compiled-in ledger backends.

use stepwise_migrate::{LedgerEntry, LedgerStore, StoreError, UnitOfWork};

use crate::memory::{MemoryLedger, MemoryUnit};
#[cfg(feature = "postgres")]
use crate::postgres::{PostgresLedger, PostgresUnit};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteLedger, SqliteUnit};

/// A ledger chosen at runtime, for callers that pick the backend from a
/// connection string.
pub enum AnyLedger {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteLedger),
    #[cfg(feature = "postgres")]
    Postgres(PostgresLedger),
    Memory(MemoryLedger),
}

impl AnyLedger {
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<SqliteLedger> for AnyLedger {
    fn from(ledger: SqliteLedger) -> Self {
        Self::Sqlite(ledger)
    }
}

#[cfg(feature = "postgres")]
impl From<PostgresLedger> for AnyLedger {
    fn from(ledger: PostgresLedger) -> Self {
        Self::Postgres(ledger)
    }
}

impl From<MemoryLedger> for AnyLedger {
    fn from(ledger: MemoryLedger) -> Self {
        Self::Memory(ledger)
    }
}

impl LedgerStore for AnyLedger {
    type Unit<'a> = AnyUnit<'a>;

    fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(ledger) => ledger.entries(),
            #[cfg(feature = "postgres")]
            Self::Postgres(ledger) => ledger.entries(),
            Self::Memory(ledger) => ledger.entries(),
        }
    }

    fn begin(&mut self) -> Result<AnyUnit<'_>, StoreError> {
        Ok(match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(ledger) => AnyUnit::Sqlite(ledger.begin()?),
            #[cfg(feature = "postgres")]
            Self::Postgres(ledger) => AnyUnit::Postgres(ledger.begin()?),
            Self::Memory(ledger) => AnyUnit::Memory(ledger.begin()?),
        })
    }
}

/// Unit of work for an [`AnyLedger`].
pub enum AnyUnit<'a> {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteUnit<'a>),
    #[cfg(feature = "postgres")]
    Postgres(PostgresUnit<'a>),
    Memory(MemoryUnit<'a>),
}

macro_rules! dispatch {
    ($unit:expr, $inner:ident => $body:expr) => {
        match $unit {
            #[cfg(feature = "sqlite")]
            AnyUnit::Sqlite($inner) => $body,
            #[cfg(feature = "postgres")]
            AnyUnit::Postgres($inner) => $body,
            AnyUnit::Memory($inner) => $body,
        }
    };
}

impl UnitOfWork for AnyUnit<'_> {
    fn execute(&mut self, effect: &str) -> Result<(), StoreError> {
        dispatch!(self, unit => unit.execute(effect))
    }

    fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError> {
        dispatch!(self, unit => unit.append(name))
    }

    fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError> {
        dispatch!(self, unit => unit.latest())
    }

    fn remove(&mut self, sequence_id: i64) -> Result<(), StoreError> {
        dispatch!(self, unit => unit.remove(sequence_id))
    }

    fn commit(self) -> Result<(), StoreError> {
        dispatch!(self, unit => unit.commit())
    }
}
