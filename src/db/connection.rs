//! Shared database handle.
//!
//! # Responsibilities
//! - Open the configured connection, reporting failures with a credential-free DSN
//! - Execute parameterized statements and decode rows into JSON maps
//! - Run units of work inside a transaction, rolling back on failure
//!
//! # Design Decisions
//! - One connection per handle, injected into builders and models; no global
//! - The connection sits behind a re-entrant lock so a transaction can hold it
//!   while the queries inside it lock it again on the same thread
//! - A transaction opened inside another one becomes a savepoint

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::{Map, Number, Value};

use crate::config::{DatabaseConfig, Driver};
use crate::db::error::{DbError, TransactionError};
use crate::db::query::QueryBuilder;

/// A decoded result row: column name to value.
pub type Row = Map<String, Value>;

/// Named bindings in the form rusqlite expects (`:name`, value).
pub(crate) type Bindings = Vec<(String, SqlValue)>;

/// Cloneable handle to one database connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<ReentrantMutex<Connection>>,
    dsn: String,
}

impl Database {
    /// Open the database described by `config`.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let dsn = config.dsn();
        if config.driver != Driver::Sqlite {
            tracing::error!(dsn = %dsn, driver = %config.driver, "Database driver not available");
            return Err(DbError::UnsupportedDriver(config.driver));
        }

        let conn = if config.database == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.database)
        }
        .map_err(|source| DbError::Connect {
            dsn: dsn.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|source| DbError::Connect {
                dsn: dsn.clone(),
                source,
            })?;

        tracing::info!(dsn = %dsn, "Database connected");
        Ok(Self {
            conn: Arc::new(ReentrantMutex::new(conn)),
            dsn,
        })
    }

    /// Fresh in-memory SQLite database.
    pub fn in_memory() -> Result<Self, DbError> {
        Self::connect(&DatabaseConfig::in_memory())
    }

    /// Credential-free connection string.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Start a query against `table`.
    pub fn table(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, table)
    }

    /// Run one or more statements without bindings (schema setup).
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        let conn = self.conn.lock();
        tracing::debug!(sql = %sql, "Executing batch");
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run a raw query with named bindings (`:name` or `name`).
    pub fn raw(&self, sql: &str, bindings: &[(&str, Value)]) -> Result<Vec<Row>, DbError> {
        self.fetch(sql, &named(bindings))
    }

    /// Run a raw statement with named bindings, returning the affected row count.
    pub fn raw_execute(&self, sql: &str, bindings: &[(&str, Value)]) -> Result<usize, DbError> {
        self.execute(sql, &named(bindings))
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds. When `f` or the commit itself fails, the work
    /// is rolled back and the cause is returned wrapped in [`TransactionError`],
    /// together with the rollback error if rolling back failed too.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Database) -> Result<T, E>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let conn = self.conn.lock();
        let nested = !conn.is_autocommit();
        let (begin, commit, rollback) = if nested {
            (
                "SAVEPOINT storefront_tx",
                "RELEASE storefront_tx",
                "ROLLBACK TO storefront_tx; RELEASE storefront_tx",
            )
        } else {
            ("BEGIN", "COMMIT", "ROLLBACK")
        };

        conn.execute_batch(begin)?;
        tracing::debug!(nested, "Transaction started");

        let cause: Box<dyn StdError + Send + Sync> = match f(self) {
            Ok(value) => match conn.execute_batch(commit) {
                Ok(()) => {
                    tracing::debug!(nested, "Transaction committed");
                    return Ok(value);
                }
                // A failed COMMIT (deferred constraints) leaves the transaction open.
                Err(err) => err.into(),
            },
            Err(err) => err.into(),
        };

        let rollback_error = conn.execute_batch(rollback).err();
        tracing::warn!(
            nested,
            error = %cause,
            rollback_failed = rollback_error.is_some(),
            "Transaction rolled back"
        );
        Err(TransactionError::new(cause, rollback_error).into())
    }

    pub(crate) fn fetch(&self, sql: &str, bindings: &Bindings) -> Result<Vec<Row>, DbError> {
        let conn = self.conn.lock();
        tracing::debug!(sql = %sql, bindings = bindings.len(), "Executing query");

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let params = as_params(bindings);
        let mut rows = stmt.query(params.as_slice())?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut decoded = Row::new();
            for (i, name) in columns.iter().enumerate() {
                decoded.insert(name.clone(), from_sql(row.get_ref(i)?));
            }
            out.push(decoded);
        }
        Ok(out)
    }

    pub(crate) fn execute(&self, sql: &str, bindings: &Bindings) -> Result<usize, DbError> {
        let conn = self.conn.lock();
        tracing::debug!(sql = %sql, bindings = bindings.len(), "Executing statement");
        let params = as_params(bindings);
        Ok(conn.execute(sql, params.as_slice())?)
    }

    /// Execute an insert and return the generated row id, under one lock.
    pub(crate) fn insert_returning_id(&self, sql: &str, bindings: &Bindings) -> Result<i64, DbError> {
        let conn = self.conn.lock();
        tracing::debug!(sql = %sql, bindings = bindings.len(), "Executing insert");
        let params = as_params(bindings);
        conn.execute(sql, params.as_slice())?;
        Ok(conn.last_insert_rowid())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("dsn", &self.dsn).finish()
    }
}

fn as_params(bindings: &Bindings) -> Vec<(&str, &dyn ToSql)> {
    bindings
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}

fn named(bindings: &[(&str, Value)]) -> Bindings {
    bindings
        .iter()
        .map(|(name, value)| {
            let name = if name.starts_with(':') {
                name.to_string()
            } else {
                format!(":{name}")
            };
            (name, to_sql(value))
        })
        .collect()
}

/// JSON value to SQL value. Structures are stored as JSON text.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
