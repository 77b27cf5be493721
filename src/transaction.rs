//! Transaction contexts: isolation, propagation and the commit/rollback
//! state machine.
//!
//! A [`TransactionContext`] owns one connection for its whole lifetime and
//! moves through `ACTIVE -> COMMITTED | ROLLED_BACK` exactly once. Contexts
//! are passed explicitly (`Option<&mut TransactionContext>` on every engine
//! call); there is no ambient thread-local transaction state. Propagation
//! rules are applied by [`DaoEngine::transaction_with`](crate::engine::DaoEngine::transaction_with),
//! which joins, creates or suspends contexts and guarantees a terminal
//! action on every exit path. Dropping a context that is still active rolls
//! it back; an unfinished scope is never an implicit commit.

use crate::connection::{Connection, ConnectionProvider};
use crate::error::GantryError;
use std::fmt;
use std::sync::Arc;

/// Transaction isolation level, fixed at context creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL rendering of the level, for driver adapters that set it via a
    /// statement.
    pub fn to_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// How an operation relates to an enclosing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Join the active context, or create one if none exists.
    #[default]
    Required,
    /// Always create a new context; an active one is parked until the new
    /// one terminates.
    RequiresNew,
    /// Join the active context if present, otherwise run autocommit.
    Supports,
    /// Always run autocommit, even inside an active context.
    NotSupported,
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Active => write!(f, "active"),
            TxStatus::Committed => write!(f, "committed"),
            TxStatus::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// A scoped database transaction owning one connection.
pub struct TransactionContext {
    connection: Option<Box<dyn Connection>>,
    provider: Arc<dyn ConnectionProvider>,
    isolation: IsolationLevel,
    status: TxStatus,
    /// Number of joined inner scopes currently on top of the owner.
    depth: u32,
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("isolation", &self.isolation)
            .field("status", &self.status)
            .field("depth", &self.depth)
            .finish()
    }
}

impl TransactionContext {
    /// Acquire a connection and begin a transaction on it.
    pub fn begin(
        provider: Arc<dyn ConnectionProvider>,
        isolation: IsolationLevel,
    ) -> Result<Self, GantryError> {
        let mut connection = provider.acquire()?;
        if let Err(err) = connection.begin(isolation) {
            provider.release(connection);
            return Err(err);
        }
        log::debug!("transaction started at {}", isolation.to_sql());
        Ok(Self {
            connection: Some(connection),
            provider,
            isolation,
            status: TxStatus::Active,
            depth: 0,
        })
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TxStatus::Active
    }

    /// The context's connection, for the engine to run statements on.
    pub(crate) fn connection(&mut self) -> Result<&mut dyn Connection, GantryError> {
        if self.status != TxStatus::Active {
            return Err(GantryError::TransactionState(format!(
                "context is {}, no further statements may run on it",
                self.status
            )));
        }
        Ok(self
            .connection
            .as_mut()
            .expect("active context holds a connection")
            .as_mut())
    }

    /// Mark a joined inner scope entering this context.
    pub(crate) fn enter_joined_scope(&mut self) {
        self.depth += 1;
    }

    /// Mark a joined inner scope leaving this context.
    pub(crate) fn exit_joined_scope(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
    }

    /// True while an inner scope has joined this context; only the owning
    /// (outermost) scope may terminate it.
    pub fn is_joined(&self) -> bool {
        self.depth > 0
    }

    /// Commit and release the connection.
    ///
    /// Fails with [`GantryError::TransactionState`] when the context was
    /// already terminated or when called from a joined inner scope.
    pub fn commit(&mut self) -> Result<(), GantryError> {
        self.terminal_action(true)
    }

    /// Roll back and release the connection. Same ownership and lifecycle
    /// rules as [`commit`](Self::commit).
    pub fn rollback(&mut self) -> Result<(), GantryError> {
        self.terminal_action(false)
    }

    fn terminal_action(&mut self, commit: bool) -> Result<(), GantryError> {
        let verb = if commit { "commit" } else { "rollback" };
        if self.depth > 0 {
            return Err(GantryError::TransactionState(format!(
                "{verb} issued by a joined scope that does not own the context"
            )));
        }
        if self.status != TxStatus::Active {
            return Err(GantryError::TransactionState(format!(
                "{verb} on a context that is already {}",
                self.status
            )));
        }
        let mut connection = self
            .connection
            .take()
            .expect("active context holds a connection");
        let result = if commit {
            connection.commit()
        } else {
            connection.rollback()
        };
        // The terminal state is reached even when the driver call fails;
        // the connection always goes back to the provider.
        self.status = if commit && result.is_ok() {
            TxStatus::Committed
        } else {
            TxStatus::RolledBack
        };
        self.provider.release(connection);
        log::debug!("transaction {}", self.status);
        result
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if self.status == TxStatus::Active {
            if let Some(mut connection) = self.connection.take() {
                log::warn!("transaction context dropped while active; rolling back");
                if let Err(err) = connection.rollback() {
                    log::error!("rollback on drop failed: {err}");
                }
                self.status = TxStatus::RolledBack;
                self.provider.release(connection);
            }
        }
    }
}
