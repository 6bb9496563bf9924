//! # stepwise-store
//!
//! Ledger backends for [`stepwise-migrate`](https://docs.rs/stepwise-migrate).
//!
//! Each backend owns its database connection, creates the ledger table when
//! opened and runs every unit of work as one database transaction.
//!
//! ## Quick Start
//!
//! ```
//! use stepwise_migrate::{LedgerStore, UnitOfWork};
//! use stepwise_store::SqliteLedger;
//!
//! let mut ledger = SqliteLedger::open_in_memory().unwrap();
//! let mut unit = ledger.begin().unwrap();
//! unit.execute("CREATE TABLE t (id INTEGER);").unwrap();
//! unit.append("20240101000000-init.sql").unwrap();
//! unit.commit().unwrap();
//!
//! assert_eq!(ledger.entries().unwrap().len(), 1);
//! ```
//!
//! ## Backends
//!
//! | Backend | Feature flag | Use case |
//! |---------|-------------|----------|
//! | [`MemoryLedger`] | *(always available)* | Testing, embedding |
//! | `SqliteLedger` | `sqlite` (default) | Local and embedded databases |
//! | `PostgresLedger` | `postgres` | PostgreSQL servers |

mod any;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;
mod table;

pub use any::{AnyLedger, AnyUnit};
pub use memory::{Executor, MemoryLedger, MemoryUnit};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresLedger, PostgresUnit};
#[cfg(feature = "sqlite")]
pub use sqlite::{JournalMode, SqliteConfig, SqliteLedger, SqliteUnit};
pub use table::{TableName, DEFAULT_TABLE};
