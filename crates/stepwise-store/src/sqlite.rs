//! SQLite ledger backend using rusqlite.
//!
//! Migrations run on the same connection as the ledger, inside one
//! rusqlite [`Transaction`] per unit of work.
//!
//! # Example
//!
//! ```no_run
//! use stepwise_migrate::{DirectoryProvider, MigrationSource, Migrator};
//! use stepwise_store::SqliteLedger;
//!
//! let ledger = SqliteLedger::open("app.db").unwrap();
//! let source = MigrationSource::new(DirectoryProvider::new("migrations"));
//! let report = Migrator::new(source, ledger).up().unwrap();
//! println!("applied {} migrations", report.applied.len());
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use stepwise_migrate::{LedgerEntry, LedgerStore, StoreError, UnitOfWork};
use tracing::debug;

use crate::table::TableName;

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// SQLite journal mode. Defaults to WAL.
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds. Defaults to 5000.
    pub busy_timeout_ms: u32,
    /// Ledger table name.
    pub table: TableName,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout_ms: 5000,
            table: TableName::default(),
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-Ahead Logging.
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal (no crash recovery).
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

/// Ledger stored in a SQLite database.
///
/// Owns its connection; the ledger table is created on open if missing.
pub struct SqliteLedger {
    conn: Connection,
    table: TableName,
}

impl SqliteLedger {
    /// Open (or create) a SQLite database at the given path with default config.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteConfig,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        Self::from_connection(conn, config)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::from_connection(conn, SqliteConfig::default())
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection, config: SqliteConfig) -> Result<Self, StoreError> {
        Self::init_connection(&conn, &config).map_err(StoreError::backend)?;
        Self::create_schema(&conn, &config.table).map_err(StoreError::backend)?;
        debug!(table = %config.table, "sqlite ledger ready");
        Ok(Self {
            conn,
            table: config.table,
        })
    }

    fn init_connection(conn: &Connection, config: &SqliteConfig) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};
             PRAGMA busy_timeout = {};
             PRAGMA foreign_keys = ON;",
            config.journal_mode.as_str(),
            config.busy_timeout_ms,
        ))
    }

    fn create_schema(conn: &Connection, table: &TableName) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                applied_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                name        TEXT NOT NULL UNIQUE
            );"
        ))
    }

    /// The underlying connection, for inspecting what migrations did.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table(&self) -> &str {
        self.table.as_str()
    }

    /// Get the current journal mode.
    pub fn journal_mode(&self) -> Result<String, StoreError> {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .map_err(StoreError::backend)
    }
}

impl LedgerStore for SqliteLedger {
    type Unit<'a> = SqliteUnit<'a>;

    fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT id, applied_at, name FROM {} ORDER BY id ASC",
                self.table
            ))
            .map_err(StoreError::backend)?;
        let entries = stmt
            .query_map([], entry_from_row)
            .map_err(StoreError::backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::backend)?;
        Ok(entries)
    }

    fn begin(&mut self) -> Result<SqliteUnit<'_>, StoreError> {
        let tx = self.conn.transaction().map_err(StoreError::backend)?;
        Ok(SqliteUnit {
            tx,
            table: self.table.as_str(),
        })
    }
}

/// An open SQLite transaction. Rolls back on drop unless committed.
pub struct SqliteUnit<'a> {
    tx: Transaction<'a>,
    table: &'a str,
}

impl UnitOfWork for SqliteUnit<'_> {
    fn execute(&mut self, effect: &str) -> Result<(), StoreError> {
        self.tx.execute_batch(effect).map_err(StoreError::backend)
    }

    fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError> {
        self.tx
            .execute(
                &format!("INSERT INTO {} (name) VALUES (?1)", self.table),
                params![name],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateName {
                        name: name.to_string(),
                    }
                } else {
                    StoreError::backend(e)
                }
            })?;
        let id = self.tx.last_insert_rowid();
        self.tx
            .query_row(
                &format!("SELECT id, applied_at, name FROM {} WHERE id = ?1", self.table),
                params![id],
                entry_from_row,
            )
            .map_err(StoreError::backend)
    }

    fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError> {
        self.tx
            .query_row(
                &format!(
                    "SELECT id, applied_at, name FROM {}
                     ORDER BY applied_at DESC, id DESC LIMIT 1",
                    self.table
                ),
                [],
                entry_from_row,
            )
            .optional()
            .map_err(StoreError::backend)
    }

    fn remove(&mut self, sequence_id: i64) -> Result<(), StoreError> {
        let deleted = self
            .tx
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", self.table),
                params![sequence_id],
            )
            .map_err(StoreError::backend)?;
        if deleted == 0 {
            return Err(StoreError::backend(format!(
                "no ledger entry with id {sequence_id}"
            )));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().map_err(StoreError::backend)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let applied_at: String = row.get(1)?;
    let applied_at = DateTime::parse_from_rfc3339(&applied_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(LedgerEntry {
        sequence_id: row.get(0)?,
        applied_at,
        name: row.get(2)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
