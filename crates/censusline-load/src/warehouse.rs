//! Warehouse ingestion (DuckDB)

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use duckdb::Connection;

use crate::object::ObjectUri;
use crate::sql;

/// Target table, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Column order of the ingested file. The key column is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub key_column: String,
    pub columns: Vec<String>,
}

impl TableLayout {
    pub fn new(key_column: impl Into<String>, columns: Vec<String>) -> Result<Self> {
        let key_column = key_column.into();
        anyhow::ensure!(
            columns.iter().any(|c| *c == key_column),
            "key column {key_column:?} not among table columns"
        );
        let mut seen = HashSet::new();
        for c in &columns {
            anyhow::ensure!(!c.is_empty(), "empty column name");
            anyhow::ensure!(seen.insert(c.as_str()), "duplicate column {c:?}");
        }
        Ok(Self {
            key_column,
            columns,
        })
    }
}

/// Loads a stored file into a table, replacing its previous contents.
pub trait Warehouse {
    /// Returns the number of rows now in the table.
    fn load(&self, uri: &ObjectUri, table: &TableRef, layout: &TableLayout) -> Result<u64>;
}

/// DuckDB database file (or in-memory database for tests).
pub struct DuckDbWarehouse {
    conn: Connection,
    s3_ready: Cell<bool>,
}

impl DuckDbWarehouse {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open DuckDB in-memory connection")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            s3_ready: Cell::new(false),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_s3(&self) -> Result<()> {
        if !self.s3_ready.get() {
            log::debug!("Loading DuckDB httpfs/aws extensions");
            self.conn
                .execute_batch(sql::enable_s3())
                .context("Failed to enable S3 access in DuckDB")?;
            self.s3_ready.set(true);
        }
        Ok(())
    }

    fn replace_contents(
        &self,
        uri: &ObjectUri,
        table: &TableRef,
        layout: &TableLayout,
    ) -> Result<()> {
        self.conn
            .execute_batch(&sql::recreate_table(table, layout))
            .with_context(|| format!("Failed to create table {table}"))?;
        self.conn
            .execute_batch(&sql::insert_from_csv(table, uri.as_str()))
            .with_context(|| format!("Failed to ingest {uri} into {table}"))?;
        Ok(())
    }
}

impl Warehouse for DuckDbWarehouse {
    fn load(&self, uri: &ObjectUri, table: &TableRef, layout: &TableLayout) -> Result<u64> {
        if uri.is_s3() {
            self.ensure_s3()?;
        }

        self.conn
            .execute_batch("BEGIN TRANSACTION;")
            .context("Failed to begin transaction")?;
        if let Err(e) = self.replace_contents(uri, table, layout) {
            if let Err(rb) = self.conn.execute_batch("ROLLBACK;") {
                log::warn!("Rollback failed: {rb}");
            }
            return Err(e);
        }
        self.conn
            .execute_batch("COMMIT;")
            .with_context(|| format!("Failed to commit load of {table}"))?;

        let rows = self
            .conn
            .query_row(&sql::count_rows(table), [], |row| row.get::<_, i64>(0))
            .with_context(|| format!("Failed to count rows in {table}"))?;
        log::info!("Loaded {rows} rows into {table}");
        Ok(rows as u64)
    }
}
