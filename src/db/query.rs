//! Fluent single-statement SQL builder.
//!
//! # Responsibilities
//! - Accumulate table, columns, where-fragments, ordering and paging
//! - Bind every value through a named placeholder (`:p1`, `:p2`, ...)
//! - Execute exactly one terminal operation
//!
//! # Design Decisions
//! - Terminal operations consume the builder; it cannot be reused
//! - Identifiers and operators are checked, values are never spliced into SQL
//! - A bad identifier is remembered and reported by the terminal operation,
//!   so chains stay fluent
//! - `where_in` with no values compiles to `1 = 0`, never `IN ()`

use std::fmt;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::db::connection::{to_sql, Bindings, Database, Row};
use crate::db::error::DbError;

const OPERATORS: [&str; 9] = ["=", "!=", "<>", "<", ">", "<=", ">=", "LIKE", "NOT LIKE"];

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        })
    }
}

/// Builder for one statement against one table.
#[must_use = "a query does nothing until a terminal operation runs"]
pub struct QueryBuilder<'db> {
    db: &'db Database,
    table: String,
    columns: Vec<String>,
    condition: Option<String>,
    bindings: Bindings,
    placeholders: usize,
    orders: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    error: Option<String>,
}

impl<'db> QueryBuilder<'db> {
    pub(crate) fn new(db: &'db Database, table: &str) -> Self {
        let mut builder = Self {
            db,
            table: String::new(),
            columns: Vec::new(),
            condition: None,
            bindings: Vec::new(),
            placeholders: 0,
            orders: Vec::new(),
            limit: None,
            offset: None,
            error: None,
        };
        builder.table = builder.identifier(table);
        builder
    }

    /// Columns to select. Defaults to `*`.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns
            .iter()
            .map(|c| if *c == "*" { "*".to_string() } else { self.identifier(c) })
            .collect();
        self
    }

    /// `column op value`, joined with `AND`.
    pub fn where_op(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        let fragment = self.comparison(column, op, value.into());
        self.and(fragment);
        self
    }

    /// `column = value`, joined with `AND`.
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, "=", value)
    }

    /// `column op value`, joined with `OR` around everything before it.
    pub fn or_where(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        let fragment = self.comparison(column, op, value.into());
        self.or(fragment);
        self
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where(column, "=", value)
    }

    /// `column IN (...)`. An empty list matches no rows.
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let column = self.identifier(column);
        let placeholders: Vec<String> = values
            .into_iter()
            .map(|v| self.bind(&v.into()))
            .collect();
        let fragment = if placeholders.is_empty() {
            "1 = 0".to_string()
        } else {
            format!("{column} IN ({})", placeholders.join(", "))
        };
        self.and(fragment);
        self
    }

    pub fn where_like(self, column: &str, pattern: impl Into<String>) -> Self {
        self.where_op(column, "LIKE", pattern.into())
    }

    pub fn where_null(mut self, column: &str) -> Self {
        let fragment = format!("{} IS NULL", self.identifier(column));
        self.and(fragment);
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        let fragment = format!("{} IS NOT NULL", self.identifier(column));
        self.and(fragment);
        self
    }

    /// Raw SQL condition with its own named bindings, joined with `AND`.
    ///
    /// Binding names must not collide with the generated `:pN` placeholders.
    pub fn where_raw(mut self, sql: &str, bindings: &[(&str, Value)]) -> Self {
        for (name, value) in bindings {
            let name = if name.starts_with(':') {
                name.to_string()
            } else {
                format!(":{name}")
            };
            self.bindings.push((name, to_sql(value)));
        }
        self.and(format!("({sql})"));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        let column = self.identifier(column);
        self.orders.push(format!("{column} {direction}"));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The `SELECT` this builder would run.
    pub fn to_sql(&self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", self.table);
        self.push_where(&mut sql);
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }

    /// Placeholder names and their bound values, in binding order.
    pub fn bindings(&self) -> Vec<(&str, Value)> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), json_of(value)))
            .collect()
    }

    /// All matching rows.
    pub fn get(self) -> Result<Vec<Row>, DbError> {
        self.check()?;
        self.db.fetch(&self.to_sql(), &self.bindings)
    }

    /// The first matching row, if any.
    pub fn first(mut self) -> Result<Option<Row>, DbError> {
        self.limit = Some(1);
        Ok(self.get()?.into_iter().next())
    }

    /// Number of matching rows. Ordering and paging are ignored.
    pub fn count(self) -> Result<i64, DbError> {
        self.check()?;
        let mut sql = format!("SELECT COUNT(*) AS aggregate FROM {}", self.table);
        self.push_where(&mut sql);
        let rows = self.db.fetch(&sql, &self.bindings)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("aggregate"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Insert one row and return its generated id.
    pub fn insert(mut self, data: &Row) -> Result<i64, DbError> {
        let mut columns = Vec::with_capacity(data.len());
        let mut values = Vec::with_capacity(data.len());
        for (column, value) in data {
            columns.push(self.identifier(column));
            values.push(self.bind(value));
        }
        self.check()?;

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                values.join(", ")
            )
        };
        self.db.insert_returning_id(&sql, &self.bindings)
    }

    /// Update matching rows with `data`, returning the affected count.
    pub fn update(mut self, data: &Row) -> Result<usize, DbError> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut assignments = Vec::with_capacity(data.len());
        for (column, value) in data {
            let column = self.identifier(column);
            let placeholder = self.bind(value);
            assignments.push(format!("{column} = {placeholder}"));
        }
        self.check()?;

        let mut sql = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        self.push_where(&mut sql);
        self.db.execute(&sql, &self.bindings)
    }

    /// Delete matching rows, returning the affected count.
    pub fn delete(self) -> Result<usize, DbError> {
        self.check()?;
        let mut sql = format!("DELETE FROM {}", self.table);
        self.push_where(&mut sql);
        self.db.execute(&sql, &self.bindings)
    }

    fn comparison(&mut self, column: &str, op: &str, value: Value) -> String {
        let column = self.identifier(column);
        let op = op.trim().to_ascii_uppercase();
        if !OPERATORS.contains(&op.as_str()) {
            self.fail(format!("unsupported operator `{op}`"));
        }
        let placeholder = self.bind(&value);
        format!("{column} {op} {placeholder}")
    }

    fn and(&mut self, fragment: String) {
        self.condition = Some(match self.condition.take() {
            Some(previous) => format!("{previous} AND {fragment}"),
            None => fragment,
        });
    }

    fn or(&mut self, fragment: String) {
        self.condition = Some(match self.condition.take() {
            Some(previous) => format!("({previous}) OR {fragment}"),
            None => fragment,
        });
    }

    fn bind(&mut self, value: &Value) -> String {
        self.placeholders += 1;
        let name = format!(":p{}", self.placeholders);
        self.bindings.push((name.clone(), to_sql(value)));
        name
    }

    fn push_where(&self, sql: &mut String) {
        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
    }

    /// Quote `name` (optionally `table.column`) or record why it is refused.
    fn identifier(&mut self, name: &str) -> String {
        let valid = !name.is_empty()
            && name.split('.').all(|part| {
                let mut chars = part.chars();
                chars
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            self.fail(format!("invalid identifier `{name}`"));
            return String::new();
        }
        name.split('.')
            .map(|part| format!("\"{part}\""))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn check(&self) -> Result<(), DbError> {
        match &self.error {
            Some(message) => Err(DbError::InvalidQuery(message.clone())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("sql", &self.to_sql())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

fn json_of(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(*i),
        SqlValue::Real(f) => Value::from(*f),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Blob(b) => Value::from(b.clone()),
    }
}
