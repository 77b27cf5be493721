//! # Gantry
//!
//! Declarative DAO execution engine: typed entity descriptors and operation
//! metadata in, parameterized SQL and mapped results out. Type-safe CRUD,
//! batch operations, pagination, streaming, join-entity loading and
//! transaction-aware execution over a relational store, without a full
//! ORM's runtime object graph.
//!
//! The connection pool and the SQL driver stay outside the crate behind the
//! [`ConnectionProvider`]/[`Connection`] capability traits; an in-memory
//! [`mock`] backend ships for tests and examples.
//!
//! ```
//! use gantry::{Col, Criteria, DaoEngine, DaoRegistry, EngineConfig};
//! use gantry::{NamingPolicy, ParameterStyle, SortDir};
//! use gantry::mock::MockProvider;
//! # use gantry::descriptor::{ColumnSpec, EntityDescriptor, Record};
//! # use gantry::executor::RowDecoder;
//! # use gantry::value::{Value, ValueKind, ValueType};
//! # use gantry::GantryError;
//! # use once_cell::sync::Lazy;
//! use std::sync::Arc;
//!
//! # #[derive(Clone, Debug)]
//! # struct User { id: i32, email: String }
//! # static USER: Lazy<EntityDescriptor> = Lazy::new(|| {
//! #     EntityDescriptor::new("User", "users", vec![
//! #         ColumnSpec::new("id", ValueKind::Int).id().read_only(),
//! #         ColumnSpec::new("email", ValueKind::String),
//! #     ]).expect("valid descriptor")
//! # });
//! # impl Record for User {
//! #     fn descriptor() -> &'static EntityDescriptor { &USER }
//! #     fn get(&self, p: &str) -> Option<Value> {
//! #         match p {
//! #             "id" => Some(self.id.into_value()),
//! #             "email" => Some(self.email.clone().into_value()),
//! #             _ => None,
//! #         }
//! #     }
//! #     fn set(&mut self, _p: &str, _v: Value) -> Result<(), GantryError> { Ok(()) }
//! #     fn from_row(row: &RowDecoder<'_>) -> Result<Self, GantryError> {
//! #         Ok(User { id: row.get("id")?, email: row.get("email")? })
//! #     }
//! # }
//! # fn main() -> Result<(), GantryError> {
//! let mut registry = DaoRegistry::new(NamingPolicy::UpperSnake, ParameterStyle::Positional);
//! registry.register_entity::<User>()?;
//!
//! let provider = Arc::new(MockProvider::new());
//! let engine = DaoEngine::new(provider, registry, EngineConfig::default())?;
//!
//! let users: Vec<User> = engine.list(
//!     &Criteria::new()
//!         .filter(Col::new("email").like("%@example.com"))
//!         .order_by("id", SortDir::Asc),
//!     None,
//! )?;
//! # let _ = users;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod condition;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod executor;
pub mod mock;
pub mod naming;
pub mod relation;
pub mod sql;
pub mod transaction;
pub mod value;

pub use cache::{CacheSettings, EntityCache};
pub use condition::{Col, ComparisonOp, ConditionNode, Criteria, JunctionOp, SortDir};
pub use config::EngineConfig;
pub use connection::{BatchResult, Connection, ConnectionProvider, ExecResult, Row};
pub use descriptor::{ColumnFlags, ColumnSpec, DescriptorRegistry, EntityDescriptor, Record};
pub use engine::{DaoEngine, DaoRegistry, Page};
pub use error::GantryError;
pub use executor::{
    BatchReport, ChunkPolicy, NoParams, ParamSource, QueryExecutor, RecordParams, RecordStream,
    RowDecoder,
};
pub use naming::NamingPolicy;
pub use relation::{Cardinality, JoinSpec, JoinTarget};
pub use sql::{ParameterStyle, SqlBuilder, SqlStatement, SqlTemplate, StatementPlan};
pub use transaction::{IsolationLevel, Propagation, TransactionContext, TxStatus};
pub use value::{Value, ValueKind, ValueTuple, ValueType};
