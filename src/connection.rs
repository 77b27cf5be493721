//! Connection capability traits and row/result shapes.
//!
//! The engine never owns a pool. It is handed a [`ConnectionProvider`] and
//! pairs every `acquire` with a `release`: per call in autocommit mode, per
//! context lifetime inside a transaction, per stream lifetime while a
//! consumer iterates.
//!
//! [`Connection`] is the seam to the external driver. Statements reaching it
//! are already positional: named tokens are resolved by the binder first.

use crate::error::GantryError;
use crate::transaction::IsolationLevel;
use crate::value::{Value, ValueType};
use std::time::Duration;

/// One result row: column identifiers (as emitted by the naming policy)
/// paired with values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of a column by identifier.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Value at a projection position.
    pub fn value_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Typed value at a projection position; `None` on a missing column or
    /// a variant mismatch.
    pub fn scalar_at<T: ValueType>(&self, idx: usize) -> Option<T> {
        self.value_at(idx).cloned().and_then(T::from_value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of a single mutating statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Database-generated key, when the driver reports one (auto-increment
    /// inserts).
    pub generated_key: Option<Value>,
}

/// Outcome of one driver batch call: per-set row counts and generated keys,
/// both in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub rows_affected: Vec<u64>,
    pub generated_keys: Vec<Value>,
}

/// Opaque handle to an open driver cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(pub u64);

/// Capability trait over one database connection.
///
/// Implemented by driver adapters outside this crate and by the in-crate
/// [`mock`](crate::mock) backend. All statements are positional (`?`
/// markers) by the time they reach a connection.
pub trait Connection: Send {
    /// Execute a mutating statement.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult, GantryError>;

    /// Execute a query and return all rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GantryError>;

    /// Execute one statement once per parameter set, as a single driver
    /// round trip.
    fn execute_batch(
        &mut self,
        sql: &str,
        param_sets: &[Vec<Value>],
    ) -> Result<BatchResult, GantryError>;

    /// Open a server-side cursor over a query.
    fn open_cursor(&mut self, sql: &str, params: &[Value]) -> Result<CursorId, GantryError>;

    /// Fetch up to `max_rows` rows from an open cursor. An empty result
    /// means the cursor is exhausted.
    fn fetch(&mut self, cursor: CursorId, max_rows: usize) -> Result<Vec<Row>, GantryError>;

    /// Close an open cursor. Must be idempotent per handle.
    fn close_cursor(&mut self, cursor: CursorId) -> Result<(), GantryError>;

    /// Start a transaction at the given isolation level.
    fn begin(&mut self, isolation: IsolationLevel) -> Result<(), GantryError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), GantryError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), GantryError>;

    /// Apply or clear a per-statement timeout. Statements exceeding it fail
    /// with [`GantryError::Timeout`].
    fn set_query_timeout(&mut self, timeout: Option<Duration>) -> Result<(), GantryError>;
}

/// External connection source. The engine acquires for the duration of one
/// call, one transaction context or one stream, then releases.
pub trait ConnectionProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn Connection>, GantryError>;

    fn release(&self, connection: Box<dyn Connection>);
}
