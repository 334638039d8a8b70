//! Execution gateway.
//!
//! The [`Database`] trait runs one read-only statement per call inside its own
//! transaction. Driver errors never escape as `Err`: they are rolled back and
//! reported as [`Execution::Failed`] so the control loop can route them.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Number, Value};
use tracing::{debug, instrument, warn};

use crate::core::types::Rows;
use crate::io::config::DatabaseConfig;

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Ok(Rows),
    Failed { reason: String },
}

/// Long-lived connection owned by exactly one session at a time.
pub trait Database {
    fn run(&mut self, sql: &str) -> Execution;
}

impl<D: Database + ?Sized> Database for &mut D {
    fn run(&mut self, sql: &str) -> Execution {
        (**self).run(sql)
    }
}

impl<D: Database + ?Sized> Database for Box<D> {
    fn run(&mut self, sql: &str) -> Execution {
        (**self).run(sql)
    }
}

/// SQLite-backed execution gateway.
#[derive(Debug)]
pub struct SqliteDatabase {
    conn: Connection,
    max_rows: usize,
}

impl SqliteDatabase {
    pub fn open(cfg: &DatabaseConfig) -> Result<Self> {
        let conn = open_connection(&cfg.path, cfg.read_only)?;
        Ok(Self::from_connection(conn, cfg.max_rows))
    }

    /// Wrap an existing connection (e.g. an in-memory database in tests).
    pub fn from_connection(conn: Connection, max_rows: usize) -> Self {
        Self { conn, max_rows }
    }

    fn query(&mut self, sql: &str) -> rusqlite::Result<Rows> {
        let tx = self.conn.transaction()?;
        let rows = {
            let mut stmt = tx.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut cursor = stmt.query([])?;
            let mut rows = Vec::new();
            while let Some(row) = cursor.next()? {
                if rows.len() >= self.max_rows {
                    break;
                }
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(to_json(row.get_ref(idx)?));
                }
                rows.push(values);
            }
            Rows { columns, rows }
        };
        tx.commit()?;
        Ok(rows)
    }
}

impl Database for SqliteDatabase {
    #[instrument(skip_all, fields(sql_bytes = sql.len()))]
    fn run(&mut self, sql: &str) -> Execution {
        // `query` drops its transaction on every error path, which rolls it back.
        match self.query(sql) {
            Ok(rows) => {
                debug!(rows = rows.len(), "statement executed and committed");
                Execution::Ok(rows)
            }
            Err(err) => {
                warn!(error = %err, "statement failed; transaction rolled back");
                Execution::Failed {
                    reason: format!("Execution error: {err}"),
                }
            }
        }
    }
}

fn open_connection(path: &Path, read_only: bool) -> Result<Connection> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI
    };
    Connection::open_with_flags(path, flags)
        .with_context(|| format!("open database {}", path.display()))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
