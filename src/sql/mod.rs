//! SQL construction: statements, the builder and the template compiler.
//!
//! - **`statement`** - [`SqlStatement`] and [`ParameterStyle`]
//! - **`builder`** - [`SqlBuilder`] turning descriptors + criteria into
//!   parameterized SELECT/INSERT/UPDATE/DELETE statements
//! - **`template`** - [`SqlTemplate`] compiler for literal SQL operations
//!   with `{placeholder}` substitution and `:named` bind tokens

pub mod builder;
pub mod statement;
pub mod template;

pub use builder::{SqlBuilder, StatementPlan};
pub use statement::{ParameterStyle, SqlStatement};
pub use template::SqlTemplate;
