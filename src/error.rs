//! Crate-wide error type.
//!
//! Every fallible operation in the engine returns [`GantryError`]. Database-facing
//! variants carry the generated SQL and bound parameter values so a failure can be
//! reproduced without re-instrumenting the caller.

use crate::value::Value;
use std::fmt;

/// Error type for all engine operations
#[derive(Debug)]
pub enum GantryError {
    /// A condition, projection or join referenced a property the entity
    /// descriptor does not declare. Raised at statement build time.
    UnknownProperty {
        /// Entity the property was looked up on
        entity: String,
        /// The property that was not found
        property: String,
    },
    /// An UPDATE or DELETE was built without a WHERE clause and without an
    /// explicit always-true condition.
    UnsafeStatement {
        /// Short description of the statement that was refused
        operation: String,
    },
    /// A named bind token could not be resolved from the entity or the
    /// explicit bind arguments.
    MissingParameter {
        /// The unresolved token name
        name: String,
        /// Statement text the token appears in
        sql: String,
    },
    /// Driver-level failure, wrapping the statement and its parameters.
    Execution {
        /// Statement text that failed
        sql: String,
        /// Parameter values bound to the statement
        params: Vec<Value>,
        /// Driver message
        message: String,
    },
    /// The statement exceeded the caller-supplied timeout.
    Timeout {
        /// Statement text that was aborted
        sql: String,
    },
    /// A join declaration is invalid (unknown target, key arity mismatch,
    /// missing ordering for a to-one join). Raised before any query runs.
    JoinConfiguration(String),
    /// Illegal transaction lifecycle transition: double commit, commit after
    /// rollback, or commit issued by a scope that does not own the context.
    TransactionState(String),
    /// Registry, template or settings problem detected at registration time.
    Configuration(String),
    /// A result row could not be mapped back into an entity.
    Mapping {
        /// Entity the row was being mapped into
        entity: String,
        /// What went wrong
        message: String,
    },
}

impl fmt::Display for GantryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GantryError::UnknownProperty { entity, property } => {
                write!(f, "Unknown property `{property}` on entity `{entity}`")
            }
            GantryError::UnsafeStatement { operation } => {
                write!(
                    f,
                    "Refusing to build unscoped statement ({operation}); pass an explicit always-true condition to opt in"
                )
            }
            GantryError::MissingParameter { name, sql } => {
                write!(f, "Missing value for bind parameter `:{name}` in `{sql}`")
            }
            GantryError::Execution {
                sql,
                params,
                message,
            } => {
                write!(
                    f,
                    "Execution error: {message} (sql: `{sql}`, params: {params:?})"
                )
            }
            GantryError::Timeout { sql } => {
                write!(f, "Statement timed out: `{sql}`")
            }
            GantryError::JoinConfiguration(s) => {
                write!(f, "Join configuration error: {s}")
            }
            GantryError::TransactionState(s) => {
                write!(f, "Transaction state error: {s}")
            }
            GantryError::Configuration(s) => {
                write!(f, "Configuration error: {s}")
            }
            GantryError::Mapping { entity, message } => {
                write!(f, "Failed to map row into `{entity}`: {message}")
            }
        }
    }
}

impl std::error::Error for GantryError {}

impl GantryError {
    /// Build an [`GantryError::Execution`] from a statement and a driver message.
    pub fn execution(sql: impl Into<String>, params: &[Value], message: impl Into<String>) -> Self {
        GantryError::Execution {
            sql: sql.into(),
            params: params.to_vec(),
            message: message.into(),
        }
    }

    /// True when the error is the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GantryError::Timeout { .. })
    }
}
