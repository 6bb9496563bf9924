//! PostgreSQL ledger backend using the synchronous `postgres` client.

use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::{Client, NoTls, Row, Transaction};
use stepwise_migrate::{LedgerEntry, LedgerStore, StoreError, UnitOfWork};
use tracing::debug;

use crate::table::TableName;

/// PostgreSQL configuration options.
#[derive(Debug, Clone, Default)]
pub struct PostgresConfig {
    /// Ledger table name.
    pub table: TableName,
}

/// Ledger stored in a PostgreSQL database.
pub struct PostgresLedger {
    client: Client,
    table: TableName,
}

impl PostgresLedger {
    /// Connect with a `postgres://` URL and the default ledger table.
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_config(url, PostgresConfig::default())
    }

    pub fn connect_with_config(url: &str, config: PostgresConfig) -> Result<Self, StoreError> {
        let client = Client::connect(url, NoTls).map_err(StoreError::backend)?;
        Self::from_client(client, config.table)
    }

    /// Wrap an already connected client. Creates the ledger table if missing.
    pub fn from_client(mut client: Client, table: TableName) -> Result<Self, StoreError> {
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id          BIGSERIAL PRIMARY KEY,
                    applied_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    name        TEXT NOT NULL UNIQUE
                );"
            ))
            .map_err(StoreError::backend)?;
        debug!(table = %table, "postgres ledger ready");
        Ok(Self { client, table })
    }

    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn table(&self) -> &str {
        self.table.as_str()
    }
}

impl LedgerStore for PostgresLedger {
    type Unit<'a> = PostgresUnit<'a>;

    fn entries(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT id, applied_at, name FROM {} ORDER BY id ASC",
                    self.table
                ),
                &[],
            )
            .map_err(StoreError::backend)?;
        rows.iter().map(entry_from_row).collect()
    }

    fn begin(&mut self) -> Result<PostgresUnit<'_>, StoreError> {
        let tx = self.client.transaction().map_err(StoreError::backend)?;
        Ok(PostgresUnit {
            tx,
            table: self.table.as_str(),
        })
    }
}

/// An open PostgreSQL transaction. Rolls back on drop unless committed.
pub struct PostgresUnit<'a> {
    tx: Transaction<'a>,
    table: &'a str,
}

impl UnitOfWork for PostgresUnit<'_> {
    fn execute(&mut self, effect: &str) -> Result<(), StoreError> {
        self.tx.batch_execute(effect).map_err(StoreError::backend)
    }

    fn append(&mut self, name: &str) -> Result<LedgerEntry, StoreError> {
        let row = self
            .tx
            .query_one(
                &format!(
                    "INSERT INTO {} (name) VALUES ($1) RETURNING id, applied_at, name",
                    self.table
                ),
                &[&name],
            )
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    StoreError::DuplicateName {
                        name: name.to_string(),
                    }
                } else {
                    StoreError::backend(e)
                }
            })?;
        entry_from_row(&row)
    }

    fn latest(&mut self) -> Result<Option<LedgerEntry>, StoreError> {
        let row = self
            .tx
            .query_opt(
                &format!(
                    "SELECT id, applied_at, name FROM {}
                     ORDER BY applied_at DESC, id DESC LIMIT 1",
                    self.table
                ),
                &[],
            )
            .map_err(StoreError::backend)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    fn remove(&mut self, sequence_id: i64) -> Result<(), StoreError> {
        let deleted = self
            .tx
            .execute(
                &format!("DELETE FROM {} WHERE id = $1", self.table),
                &[&sequence_id],
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

fn entry_from_row(row: &Row) -> Result<LedgerEntry, StoreError> {
    let sequence_id: i64 = row.try_get(0).map_err(StoreError::backend)?;
    let applied_at: DateTime<Utc> = row.try_get(1).map_err(StoreError::backend)?;
    let name: String = row.try_get(2).map_err(StoreError::backend)?;
    Ok(LedgerEntry {
        sequence_id,
        applied_at,
        name,
    })
}
