//! Parameterized SQL statements.

use crate::value::Value;

/// How parameters appear in the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterStyle {
    /// `?` markers; values bind strictly left to right.
    #[default]
    Positional,
    /// `:propertyName` tokens, resolved by name before execution.
    Named,
}

/// An immutable SQL statement plus its parameters.
///
/// Produced by the builder or the template renderer, consumed exactly once
/// by the executor. For [`ParameterStyle::Positional`] the `values` sequence
/// matches the `?` markers left to right. For [`ParameterStyle::Named`] the
/// `names` sequence lists the `:token` occurrences in order; `values` is
/// either aligned with `names` (statements prebound by the builder) or empty
/// (templates, resolved against bind arguments at execution).
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    text: String,
    style: ParameterStyle,
    values: Vec<Value>,
    names: Vec<String>,
}

impl SqlStatement {
    /// A positional statement with its ordered values.
    pub fn positional(text: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            style: ParameterStyle::Positional,
            values,
            names: Vec::new(),
        }
    }

    /// A named statement whose tokens are already paired with values.
    pub fn named_bound(text: impl Into<String>, names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            style: ParameterStyle::Named,
            values,
            names,
        }
    }

    /// A named statement to be resolved against bind arguments later.
    pub fn named_unbound(text: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            text: text.into(),
            style: ParameterStyle::Named,
            values: Vec::new(),
            names,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> ParameterStyle {
        self.style
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// True when every named token already has a value.
    pub fn is_bound(&self) -> bool {
        match self.style {
            ParameterStyle::Positional => true,
            ParameterStyle::Named => self.values.len() == self.names.len(),
        }
    }
}
