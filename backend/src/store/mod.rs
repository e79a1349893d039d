//! Store abstraction shared by every repository.
//!
//! A [`Statement`] is plain SQL with positional (`$1`, `$2`, ...) bind
//! arguments. Row-returning statements come back as [`Rows`], an owned cursor
//! of column-name keyed [`Row`]s that repositories decode into their own row
//! structs with serde.

pub mod postgres;
pub mod retry;

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::StoreError;

pub use postgres::PgStore;
pub use retry::{RetryPolicy, RetryStore};

/// Deadline carried by every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn at(at: Instant) -> Self {
        Self { at: Some(at) }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// Positional bind argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    NullUuid,
    NullTimestamp,
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<Uuid> for SqlArg {
    fn from(v: Uuid) -> Self {
        SqlArg::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlArg {
    fn from(v: DateTime<Utc>) -> Self {
        SqlArg::Timestamp(v)
    }
}

impl From<Option<Uuid>> for SqlArg {
    fn from(v: Option<Uuid>) -> Self {
        v.map_or(SqlArg::NullUuid, SqlArg::Uuid)
    }
}

impl From<Option<DateTime<Utc>>> for SqlArg {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map_or(SqlArg::NullTimestamp, SqlArg::Timestamp)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: &'static str,
    pub args: Vec<SqlArg>,
}

impl Statement {
    pub fn new(sql: &'static str) -> Self {
        Self {
            sql,
            args: Vec::new(),
        }
    }

    pub fn bind(mut self, arg: impl Into<SqlArg>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// One result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Map<String, Value>,
}

impl Row {
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        match serde_json::from_str(raw) {
            Ok(Value::Object(columns)) => Ok(Self { columns }),
            Ok(other) => Err(StoreError::Decode(format!("expected a json object, got {other}"))),
            Err(e) => Err(StoreError::Decode(e.to_string())),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.columns))
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Owned multi-row cursor. Dropping it releases everything it holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    rows: VecDeque<Row>,
}

impl Rows {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn decode_all<T: DeserializeOwned>(self) -> Result<Vec<T>, StoreError> {
        self.rows.into_iter().map(Row::decode).collect()
    }
}

impl From<Vec<Row>> for Rows {
    fn from(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }
}

/// Raw data-store capability. Implemented by the Postgres store and by the
/// retrying adapter that wraps it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Runs a write and returns the number of affected rows.
    async fn execute(&self, deadline: &Deadline, stmt: &Statement) -> Result<u64, StoreError>;

    async fn query_many(&self, deadline: &Deadline, stmt: &Statement) -> Result<Rows, StoreError>;

    /// First row of the result, or `NoRows` when the result is empty.
    async fn query_one(&self, deadline: &Deadline, stmt: &Statement) -> Result<Row, StoreError> {
        self.query_many(deadline, stmt)
            .await?
            .next()
            .ok_or(StoreError::NoRows)
    }
}
