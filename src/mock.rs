//! Scripted in-memory backend for tests and examples.
//!
//! The real driver is an external collaborator, so the crate ships a mock
//! [`ConnectionProvider`] in the append-results style: queue up query, exec
//! and batch results ahead of a call, then assert against the journal of
//! statements the engine actually ran.
//!
//! ## Example
//!
//! ```
//! use gantry::mock::MockProvider;
//! use gantry::connection::{Connection, ConnectionProvider, Row};
//! use gantry::value::Value;
//!
//! let provider = MockProvider::new();
//! provider.append_query_results(vec![vec![Row::new(
//!     vec!["ID".to_string()],
//!     vec![Value::from(1)],
//! )]]);
//!
//! let mut conn = provider.acquire().unwrap();
//! let rows = conn.query("SELECT ID FROM user1", &[]).unwrap();
//! assert_eq!(rows.len(), 1);
//! provider.release(conn);
//!
//! assert_eq!(provider.journal().sql_log(), vec!["SELECT ID FROM user1"]);
//! ```
//!
//! Unscripted calls fall back to benign defaults: queries return no rows,
//! mutations report one affected row, and INSERT statements hand out
//! sequential generated keys, which keeps bulk tests free of thousand-entry
//! scripts.

use crate::connection::{BatchResult, Connection, ConnectionProvider, CursorId, ExecResult, Row};
use crate::error::GantryError;
use crate::transaction::IsolationLevel;
use crate::value::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What kind of call a journal entry records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Query,
    Batch { sets: usize },
    OpenCursor,
    Fetch,
    CloseCursor,
    Begin,
    Commit,
    Rollback,
}

/// One recorded driver call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct JournalInner {
    calls: Vec<RecordedCall>,
    acquired: usize,
    released: usize,
}

/// Shared, append-only record of everything the backend was asked to do.
#[derive(Clone, Default)]
pub struct Journal {
    inner: Arc<Mutex<JournalInner>>,
}

impl Journal {
    fn push(&self, call: RecordedCall) {
        self.inner.lock().expect("journal lock").calls.push(call);
    }

    fn note_acquired(&self) {
        self.inner.lock().expect("journal lock").acquired += 1;
    }

    fn note_released(&self) {
        self.inner.lock().expect("journal lock").released += 1;
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().expect("journal lock").calls.clone()
    }

    /// Statement texts of execute/query/batch/open-cursor calls, in order.
    pub fn sql_log(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c.kind,
                    CallKind::Execute | CallKind::Query | CallKind::Batch { .. } | CallKind::OpenCursor
                )
            })
            .map(|c| c.sql)
            .collect()
    }

    /// BEGIN/COMMIT/ROLLBACK events across all connections, in call order.
    pub fn transaction_events(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.kind {
                CallKind::Begin => Some("BEGIN"),
                CallKind::Commit => Some("COMMIT"),
                CallKind::Rollback => Some("ROLLBACK"),
                _ => None,
            })
            .collect()
    }

    /// Number of query calls (not counting cursor fetches).
    pub fn query_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.kind == CallKind::Query)
            .count()
    }

    /// Parameter-set counts of each batch call, in order.
    pub fn batch_set_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.kind {
                CallKind::Batch { sets } => Some(sets),
                _ => None,
            })
            .collect()
    }

    pub fn acquired(&self) -> usize {
        self.inner.lock().expect("journal lock").acquired
    }

    pub fn released(&self) -> usize {
        self.inner.lock().expect("journal lock").released
    }
}

#[derive(Default)]
struct Script {
    query_results: Mutex<VecDeque<Vec<Row>>>,
    exec_results: Mutex<VecDeque<ExecResult>>,
    batch_results: Mutex<VecDeque<BatchResult>>,
    /// Statements containing this substring fail with an execution error.
    error_on: Mutex<Option<String>>,
    /// Statements containing this substring time out when a statement
    /// timeout is in force.
    slow_on: Mutex<Option<String>>,
    next_key: AtomicI64,
}

impl Script {
    fn check_error(&self, sql: &str, params: &[Value]) -> Result<(), GantryError> {
        if let Some(marker) = self.error_on.lock().expect("script lock").as_deref() {
            if sql.contains(marker) {
                return Err(GantryError::execution(sql, params, "scripted failure"));
            }
        }
        Ok(())
    }

    fn check_timeout(
        &self,
        sql: &str,
        timeout: Option<Duration>,
    ) -> Result<(), GantryError> {
        if timeout.is_some() {
            if let Some(marker) = self.slow_on.lock().expect("script lock").as_deref() {
                if sql.contains(marker) {
                    return Err(GantryError::Timeout {
                        sql: sql.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn next_generated_key(&self) -> Value {
        Value::BigInt(Some(self.next_key.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Scripted connection source backing the test suites.
pub struct MockProvider {
    script: Arc<Script>,
    journal: Journal,
    next_cursor: Arc<AtomicU64>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        let script = Script {
            next_key: AtomicI64::new(1),
            ..Script::default()
        };
        Self {
            script: Arc::new(script),
            journal: Journal::default(),
            next_cursor: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queue result sets for upcoming queries (and cursor opens), oldest
    /// first.
    pub fn append_query_results(&self, results: Vec<Vec<Row>>) {
        self.script
            .query_results
            .lock()
            .expect("script lock")
            .extend(results);
    }

    /// Queue outcomes for upcoming mutating statements, oldest first.
    pub fn append_exec_results(&self, results: Vec<ExecResult>) {
        self.script
            .exec_results
            .lock()
            .expect("script lock")
            .extend(results);
    }

    /// Queue outcomes for upcoming batch calls, oldest first.
    pub fn append_batch_results(&self, results: Vec<BatchResult>) {
        self.script
            .batch_results
            .lock()
            .expect("script lock")
            .extend(results);
    }

    /// Make statements containing `marker` fail with an execution error.
    /// Queued scripted results are served first, so a test can script N
    /// successes and have the failure hit call N+1.
    pub fn fail_statements_containing(&self, marker: impl Into<String>) {
        *self.script.error_on.lock().expect("script lock") = Some(marker.into());
    }

    /// Make statements containing `marker` time out whenever a statement
    /// timeout is in force.
    pub fn slow_statements_containing(&self, marker: impl Into<String>) {
        *self.script.slow_on.lock().expect("script lock") = Some(marker.into());
    }

    /// The shared call journal.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl ConnectionProvider for MockProvider {
    fn acquire(&self) -> Result<Box<dyn Connection>, GantryError> {
        self.journal.note_acquired();
        Ok(Box::new(MockConnection {
            script: Arc::clone(&self.script),
            journal: self.journal.clone(),
            next_cursor: Arc::clone(&self.next_cursor),
            cursors: HashMap::new(),
            timeout: None,
        }))
    }

    fn release(&self, _connection: Box<dyn Connection>) {
        self.journal.note_released();
    }
}

struct MockConnection {
    script: Arc<Script>,
    journal: Journal,
    next_cursor: Arc<AtomicU64>,
    cursors: HashMap<u64, VecDeque<Row>>,
    timeout: Option<Duration>,
}

impl Connection for MockConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult, GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Execute,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if let Some(scripted) = self
            .script
            .exec_results
            .lock()
            .expect("script lock")
            .pop_front()
        {
            return Ok(scripted);
        }
        self.script.check_timeout(sql, self.timeout)?;
        self.script.check_error(sql, params)?;
        let generated_key = if sql.trim_start().to_uppercase().starts_with("INSERT") {
            Some(self.script.next_generated_key())
        } else {
            None
        };
        Ok(ExecResult {
            rows_affected: 1,
            generated_key,
        })
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Query,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if let Some(scripted) = self
            .script
            .query_results
            .lock()
            .expect("script lock")
            .pop_front()
        {
            return Ok(scripted);
        }
        self.script.check_timeout(sql, self.timeout)?;
        self.script.check_error(sql, params)?;
        Ok(Vec::new())
    }

    fn execute_batch(
        &mut self,
        sql: &str,
        param_sets: &[Vec<Value>],
    ) -> Result<BatchResult, GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Batch {
                sets: param_sets.len(),
            },
            sql: sql.to_string(),
            params: Vec::new(),
        });
        if let Some(scripted) = self
            .script
            .batch_results
            .lock()
            .expect("script lock")
            .pop_front()
        {
            return Ok(scripted);
        }
        self.script.check_timeout(sql, self.timeout)?;
        self.script.check_error(sql, &[])?;
        let is_insert = sql.trim_start().to_uppercase().starts_with("INSERT");
        let mut result = BatchResult::default();
        for _ in param_sets {
            result.rows_affected.push(1);
            if is_insert {
                result.generated_keys.push(self.script.next_generated_key());
            }
        }
        Ok(result)
    }

    fn open_cursor(&mut self, sql: &str, params: &[Value]) -> Result<CursorId, GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::OpenCursor,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.script.check_timeout(sql, self.timeout)?;
        self.script.check_error(sql, params)?;
        let rows = self
            .script
            .query_results
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_default();
        let id = self.next_cursor.fetch_add(1, Ordering::SeqCst);
        self.cursors.insert(id, rows.into());
        Ok(CursorId(id))
    }

    fn fetch(&mut self, cursor: CursorId, max_rows: usize) -> Result<Vec<Row>, GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Fetch,
            sql: String::new(),
            params: Vec::new(),
        });
        let pending = self.cursors.get_mut(&cursor.0).ok_or_else(|| {
            GantryError::execution("FETCH", &[], format!("cursor {} is not open", cursor.0))
        })?;
        let take = max_rows.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    fn close_cursor(&mut self, cursor: CursorId) -> Result<(), GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::CloseCursor,
            sql: String::new(),
            params: Vec::new(),
        });
        self.cursors.remove(&cursor.0);
        Ok(())
    }

    fn begin(&mut self, isolation: IsolationLevel) -> Result<(), GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Begin,
            sql: format!("BEGIN {}", isolation.to_sql()),
            params: Vec::new(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Commit,
            sql: "COMMIT".to_string(),
            params: Vec::new(),
        });
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), GantryError> {
        self.journal.push(RecordedCall {
            kind: CallKind::Rollback,
            sql: "ROLLBACK".to_string(),
            params: Vec::new(),
        });
        Ok(())
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) -> Result<(), GantryError> {
        self.timeout = timeout;
        Ok(())
    }
}
