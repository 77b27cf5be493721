//! Statement execution: parameter binding, result mapping, batching and
//! streaming.
//!
//! The executor sits between built [`SqlStatement`]s and a [`Connection`].
//! Named statements are resolved to positional form here: each `:token` is
//! looked up against a [`ParamSource`] (an entity, an explicit bind map, or
//! the values the builder already paired with the tokens), and an unresolved
//! token fails with [`GantryError::MissingParameter`] before the driver sees
//! the statement.
//!
//! Batch execution partitions the input into chunks of exactly `batch_size`
//! (the last chunk may be smaller), runs one driver batch call per chunk and
//! accumulates row counts and generated keys in input order, so round trips
//! are `ceil(n / batch_size)` and memory stays bounded for very large
//! inputs.

use crate::connection::{BatchResult, Connection, ConnectionProvider, CursorId, ExecResult, Row};
use crate::descriptor::{EntityDescriptor, Record};
use crate::error::GantryError;
use crate::naming::NamingPolicy;
use crate::sql::statement::{ParameterStyle, SqlStatement};
use crate::value::{Value, ValueType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

static NAMED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(::)|:[A-Za-z_][A-Za-z0-9_]*").expect("token pattern compiles"));

/// Source of values for named bind tokens.
pub trait ParamSource {
    fn value_of(&self, name: &str) -> Option<Value>;
}

/// The empty source; any token lookup fails.
pub struct NoParams;

impl ParamSource for NoParams {
    fn value_of(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl ParamSource for HashMap<String, Value> {
    fn value_of(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Bind tokens from an entity's property values.
pub struct RecordParams<'a, R: Record>(pub &'a R);

impl<R: Record> ParamSource for RecordParams<'_, R> {
    fn value_of(&self, name: &str) -> Option<Value> {
        self.0.get(name)
    }
}

/// Resolve a statement into driver-ready positional form.
///
/// Positional statements pass through. Named statements have each token
/// replaced with `?`: prebound statements take their values in token order,
/// unbound ones resolve each token against `source`. `::` sequences are
/// preserved.
pub fn resolve(
    statement: &SqlStatement,
    source: &dyn ParamSource,
) -> Result<(String, Vec<Value>), GantryError> {
    match statement.style() {
        ParameterStyle::Positional => {
            Ok((statement.text().to_string(), statement.values().to_vec()))
        }
        ParameterStyle::Named => {
            let text = statement.text();
            let bound = statement.is_bound();
            let mut out = String::with_capacity(text.len());
            let mut values = Vec::with_capacity(statement.names().len());
            let mut token_idx = 0;
            let mut last = 0;
            for m in NAMED_TOKEN.find_iter(text) {
                out.push_str(&text[last..m.start()]);
                if m.as_str() == "::" {
                    out.push_str("::");
                } else {
                    let name = &m.as_str()[1..];
                    let value = if bound {
                        statement.values().get(token_idx).cloned().ok_or_else(|| {
                            GantryError::MissingParameter {
                                name: name.to_string(),
                                sql: text.to_string(),
                            }
                        })?
                    } else {
                        source
                            .value_of(name)
                            .ok_or_else(|| GantryError::MissingParameter {
                                name: name.to_string(),
                                sql: text.to_string(),
                            })?
                    };
                    token_idx += 1;
                    values.push(value);
                    out.push('?');
                }
                last = m.end();
            }
            out.push_str(&text[last..]);
            Ok((out, values))
        }
    }
}

/// A result row viewed through an entity descriptor and the active naming
/// policy, so `from_row` implementations read properties, not column
/// identifiers.
pub struct RowDecoder<'a> {
    row: &'a Row,
    descriptor: &'static EntityDescriptor,
    naming: NamingPolicy,
}

impl<'a> RowDecoder<'a> {
    pub fn new(row: &'a Row, descriptor: &'static EntityDescriptor, naming: NamingPolicy) -> Self {
        Self {
            row,
            descriptor,
            naming,
        }
    }

    /// Raw value of a property's column.
    pub fn value(&self, property: &str) -> Result<Value, GantryError> {
        let column = self.descriptor.require(property)?;
        let name = column.column_name(self.naming);
        self.row
            .get(&name)
            .cloned()
            .ok_or_else(|| GantryError::Mapping {
                entity: self.descriptor.entity().to_string(),
                message: format!("column `{name}` is missing from the result row"),
            })
    }

    /// Typed value of a property's column.
    pub fn get<T: ValueType>(&self, property: &str) -> Result<T, GantryError> {
        let value = self.value(property)?;
        let kind = value.kind();
        T::from_value(value).ok_or_else(|| GantryError::Mapping {
            entity: self.descriptor.entity().to_string(),
            message: format!("property `{property}` cannot be read from a {kind:?} value"),
        })
    }
}

/// How a batch reacts to a failing chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkPolicy {
    /// Stop at the first failing chunk and surface its error.
    #[default]
    AbortOnError,
    /// Record the failure, skip the chunk's results and keep going.
    ContinueOnError,
}

/// Accumulated outcome of a chunked batch execution.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Per-input-row counts, input order, successful chunks only.
    pub rows_affected: Vec<u64>,
    /// Generated keys, input order, successful chunks only.
    pub generated_keys: Vec<Value>,
    /// Chunks attempted, including failed ones.
    pub chunks_attempted: usize,
    /// Chunks that completed.
    pub chunks_succeeded: usize,
    /// Failures by chunk index, populated under
    /// [`ChunkPolicy::ContinueOnError`].
    pub failures: Vec<(usize, GantryError)>,
}

/// Orchestrates statement preparation, execution, batching and streaming
/// over a connection.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    naming: NamingPolicy,
    fetch_size: usize,
    timeout: Option<Duration>,
}

impl QueryExecutor {
    pub fn new(naming: NamingPolicy, fetch_size: usize, timeout: Option<Duration>) -> Self {
        Self {
            naming,
            fetch_size,
            timeout,
        }
    }

    pub fn naming(&self) -> NamingPolicy {
        self.naming
    }

    /// Run a mutating statement and return its outcome.
    pub fn execute(
        &self,
        connection: &mut dyn Connection,
        statement: &SqlStatement,
        source: &dyn ParamSource,
    ) -> Result<ExecResult, GantryError> {
        let (sql, values) = resolve(statement, source)?;
        log::debug!("execute: {sql} {values:?}");
        self.with_timeout(connection, |conn| conn.execute(&sql, &values))
    }

    /// Run a query and return raw rows.
    pub fn query_rows(
        &self,
        connection: &mut dyn Connection,
        statement: &SqlStatement,
        source: &dyn ParamSource,
    ) -> Result<Vec<Row>, GantryError> {
        let (sql, values) = resolve(statement, source)?;
        log::debug!("query: {sql} {values:?}");
        self.with_timeout(connection, |conn| conn.query(&sql, &values))
    }

    /// Run a query and map every row into an entity. A mapping failure on
    /// any row aborts the whole call.
    pub fn query_records<R: Record>(
        &self,
        connection: &mut dyn Connection,
        statement: &SqlStatement,
        source: &dyn ParamSource,
    ) -> Result<Vec<R>, GantryError> {
        let rows = self.query_rows(connection, statement, source)?;
        let descriptor = R::descriptor();
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoder = RowDecoder::new(row, descriptor, self.naming);
            records.push(R::from_row(&decoder)?);
        }
        Ok(records)
    }

    /// Run a query expected to match at most one row.
    pub fn query_optional<R: Record>(
        &self,
        connection: &mut dyn Connection,
        statement: &SqlStatement,
        source: &dyn ParamSource,
    ) -> Result<Option<R>, GantryError> {
        Ok(self
            .query_records(connection, statement, source)?
            .into_iter()
            .next())
    }

    /// Run a query and read the first column of the first row.
    pub fn query_scalar<T: ValueType>(
        &self,
        connection: &mut dyn Connection,
        statement: &SqlStatement,
        source: &dyn ParamSource,
    ) -> Result<Option<T>, GantryError> {
        let rows = self.query_rows(connection, statement, source)?;
        match rows.first() {
            None => Ok(None),
            Some(row) => {
                let value = row.value_at(0).cloned().ok_or_else(|| GantryError::Mapping {
                    entity: "scalar".to_string(),
                    message: "result row has no columns".to_string(),
                })?;
                let kind = value.kind();
                T::from_value(value)
                    .map(Some)
                    .ok_or_else(|| GantryError::Mapping {
                        entity: "scalar".to_string(),
                        message: format!("scalar cannot be read from a {kind:?} value"),
                    })
            }
        }
    }

    /// Execute `text` once per parameter set, chunked to `batch_size` sets
    /// per driver round trip.
    ///
    /// Round trips equal `ceil(param_sets.len() / batch_size)`; results keep
    /// input order. Under [`ChunkPolicy::AbortOnError`] the first failing
    /// chunk surfaces its error (annotated with how many chunks completed);
    /// under [`ChunkPolicy::ContinueOnError`] failures are collected in the
    /// report and the remaining chunks still run.
    pub fn run_batch(
        &self,
        connection: &mut dyn Connection,
        text: &str,
        param_sets: &[Vec<Value>],
        batch_size: usize,
        policy: ChunkPolicy,
    ) -> Result<BatchReport, GantryError> {
        if batch_size == 0 {
            return Err(GantryError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        let mut report = BatchReport::default();
        if param_sets.is_empty() {
            return Ok(report);
        }

        let total_chunks = param_sets.len().div_ceil(batch_size);
        for (chunk_idx, chunk) in param_sets.chunks(batch_size).enumerate() {
            report.chunks_attempted += 1;
            let outcome = self.with_timeout(connection, |conn| conn.execute_batch(text, chunk));
            match outcome {
                Ok(BatchResult {
                    rows_affected,
                    generated_keys,
                }) => {
                    report.chunks_succeeded += 1;
                    report.rows_affected.extend(rows_affected);
                    report.generated_keys.extend(generated_keys);
                }
                Err(err) => match policy {
                    ChunkPolicy::AbortOnError => {
                        log::warn!(
                            "batch aborted at chunk {}/{total_chunks} after {} successful chunks",
                            chunk_idx + 1,
                            report.chunks_succeeded
                        );
                        return Err(annotate_chunk_failure(err, chunk_idx, total_chunks, report.chunks_succeeded));
                    }
                    ChunkPolicy::ContinueOnError => {
                        log::warn!("batch chunk {}/{total_chunks} failed: {err}", chunk_idx + 1);
                        report.failures.push((chunk_idx, err));
                    }
                },
            }
        }
        Ok(report)
    }

    fn with_timeout<T>(
        &self,
        connection: &mut dyn Connection,
        f: impl FnOnce(&mut dyn Connection) -> Result<T, GantryError>,
    ) -> Result<T, GantryError> {
        match self.timeout {
            None => f(connection),
            Some(timeout) => {
                connection.set_query_timeout(Some(timeout))?;
                let result = f(connection);
                // Clearing the timeout must not mask the statement's result.
                if let Err(err) = connection.set_query_timeout(None) {
                    log::warn!("failed to clear statement timeout: {err}");
                }
                result
            }
        }
    }

    /// Open a lazy stream over a query. The stream owns its own provider
    /// connection until it is exhausted or dropped.
    pub fn open_stream<R: Record>(
        &self,
        provider: Arc<dyn ConnectionProvider>,
        statement: &SqlStatement,
        source: &dyn ParamSource,
    ) -> Result<RecordStream<R>, GantryError> {
        let (sql, values) = resolve(statement, source)?;
        RecordStream::open(provider, self.naming, self.fetch_size, &sql, &values)
    }
}

fn annotate_chunk_failure(
    err: GantryError,
    chunk_idx: usize,
    total_chunks: usize,
    succeeded: usize,
) -> GantryError {
    match err {
        GantryError::Execution {
            sql,
            params,
            message,
        } => GantryError::Execution {
            sql,
            params,
            message: format!(
                "{message}; chunk {}/{total_chunks} failed, {succeeded} chunks completed",
                chunk_idx + 1
            ),
        },
        other => other,
    }
}

/// A lazy, finite, forward-only stream of entities over a driver cursor.
///
/// The stream holds one provider connection for as long as it is consumed;
/// the cursor and connection are released exactly once, on exhaustion or on
/// drop, whichever comes first. Streams are not restartable. Callers must
/// bound a stream's lifetime or they hold a pool slot for that long.
pub struct RecordStream<R: Record> {
    provider: Arc<dyn ConnectionProvider>,
    connection: Option<Box<dyn Connection>>,
    cursor: Option<CursorId>,
    buffer: VecDeque<Row>,
    fetch_size: usize,
    naming: NamingPolicy,
    _marker: PhantomData<R>,
}

impl<R: Record> RecordStream<R> {
    fn open(
        provider: Arc<dyn ConnectionProvider>,
        naming: NamingPolicy,
        fetch_size: usize,
        sql: &str,
        params: &[Value],
    ) -> Result<Self, GantryError> {
        let mut connection = provider.acquire()?;
        match connection.open_cursor(sql, params) {
            Ok(cursor) => Ok(Self {
                provider,
                connection: Some(connection),
                cursor: Some(cursor),
                buffer: VecDeque::new(),
                fetch_size: fetch_size.max(1),
                naming,
                _marker: PhantomData,
            }),
            Err(err) => {
                provider.release(connection);
                Err(err)
            }
        }
    }

    /// True once the cursor and connection have been released.
    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Some(cursor) = self.cursor.take() {
                if let Err(err) = connection.close_cursor(cursor) {
                    log::warn!("closing stream cursor failed: {err}");
                }
            }
            self.provider.release(connection);
        }
    }
}

impl<R: Record> Iterator for RecordStream<R> {
    type Item = Result<R, GantryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                let decoder = RowDecoder::new(&row, R::descriptor(), self.naming);
                return match R::from_row(&decoder) {
                    Ok(record) => Some(Ok(record)),
                    Err(err) => {
                        self.close();
                        Some(Err(err))
                    }
                };
            }
            let cursor = self.cursor?;
            let connection = self.connection.as_mut()?;
            match connection.fetch(cursor, self.fetch_size) {
                Ok(rows) if rows.is_empty() => {
                    self.close();
                    return None;
                }
                Ok(rows) => self.buffer.extend(rows),
                Err(err) => {
                    self.close();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<R: Record> Drop for RecordStream<R> {
    fn drop(&mut self) {
        self.close();
    }
}
