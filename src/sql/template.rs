//! Literal SQL templates with `{placeholder}` substitution and `:named`
//! bind tokens.
//!
//! Templates back declarative operations that a generated CRUD shape cannot
//! express. They are compiled into a typed segment list when the operation
//! is registered, so malformed templates fail at startup instead of at each
//! call. `{placeholder}` sites splice caller-supplied text (column lists,
//! table suffixes) into the statement; `:name` sites become bind parameters
//! resolved from bind arguments at execution time. A `::` sequence is left
//! alone, so dialect casts survive.

use crate::error::GantryError;
use crate::sql::statement::SqlStatement;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\{[A-Za-z_][A-Za-z0-9_]*\})|(::)|(:[A-Za-z_][A-Za-z0-9_]*)")
        .expect("token pattern compiles")
});

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
    Bind(String),
}

/// A compiled SQL template.
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    name: String,
    segments: Vec<Segment>,
    bind_names: Vec<String>,
    placeholder_names: Vec<String>,
}

impl SqlTemplate {
    /// Compile and validate a template.
    ///
    /// Fails with [`GantryError::Configuration`] on stray braces or an
    /// effectively empty statement.
    pub fn compile(name: impl Into<String>, raw: &str) -> Result<Self, GantryError> {
        let name = name.into();
        if raw.trim().is_empty() {
            return Err(GantryError::Configuration(format!(
                "template `{name}` is empty"
            )));
        }

        let mut segments = Vec::new();
        let mut bind_names = Vec::new();
        let mut placeholder_names = Vec::new();
        let mut last = 0;

        for m in TOKEN.find_iter(raw) {
            if m.start() > last {
                segments.push(Segment::Literal(raw[last..m.start()].to_string()));
            }
            let token = m.as_str();
            if token == "::" {
                segments.push(Segment::Literal("::".to_string()));
            } else if let Some(inner) = token.strip_prefix('{') {
                let placeholder = inner
                    .strip_suffix('}')
                    .expect("placeholder token is brace-delimited")
                    .to_string();
                if !placeholder_names.contains(&placeholder) {
                    placeholder_names.push(placeholder.clone());
                }
                segments.push(Segment::Placeholder(placeholder));
            } else {
                let bind = token[1..].to_string();
                bind_names.push(bind.clone());
                segments.push(Segment::Bind(bind));
            }
            last = m.end();
        }
        if last < raw.len() {
            segments.push(Segment::Literal(raw[last..].to_string()));
        }

        for segment in &segments {
            if let Segment::Literal(text) = segment {
                if text.contains('{') || text.contains('}') {
                    return Err(GantryError::Configuration(format!(
                        "template `{name}` has a stray brace in `{text}`"
                    )));
                }
            }
        }

        Ok(Self {
            name,
            segments,
            bind_names,
            placeholder_names,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind token names in occurrence order.
    pub fn bind_names(&self) -> &[String] {
        &self.bind_names
    }

    /// Distinct placeholder names.
    pub fn placeholder_names(&self) -> &[String] {
        &self.placeholder_names
    }

    /// Splice placeholder text into the template.
    ///
    /// The result keeps its `:name` tokens; the executor resolves them from
    /// bind arguments. A placeholder with no supplied value fails with
    /// [`GantryError::MissingParameter`].
    pub fn render(
        &self,
        placeholders: &HashMap<String, String>,
    ) -> Result<SqlStatement, GantryError> {
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => text.push_str(s),
                Segment::Bind(name) => {
                    text.push(':');
                    text.push_str(name);
                }
                Segment::Placeholder(name) => {
                    let value = placeholders.get(name).ok_or_else(|| {
                        GantryError::MissingParameter {
                            name: name.clone(),
                            sql: self.raw_text(),
                        }
                    })?;
                    text.push_str(value);
                }
            }
        }
        Ok(SqlStatement::named_unbound(text, self.bind_names.clone()))
    }

    fn raw_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Bind(name) => {
                    out.push(':');
                    out.push_str(name);
                }
                Segment::Placeholder(name) => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        out
    }
}
