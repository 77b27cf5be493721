//! Property-name to column-name conversion.
//!
//! Descriptors declare properties in the application's naming convention
//! (usually camelCase). The active [`NamingPolicy`] converts every
//! property-derived identifier the builder emits; result mapping applies the
//! same policy so rows round-trip. Table names come from the descriptor
//! verbatim and are never converted. An explicit column name on a
//! [`ColumnSpec`](crate::descriptor::ColumnSpec) overrides the policy for
//! that column.

/// Identifier conversion policy for emitted column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// Use the property name unchanged.
    AsDeclared,
    /// `firstName` -> `first_name`
    LowerSnake,
    /// `firstName` -> `FIRST_NAME`
    #[default]
    UpperSnake,
    /// `first_name` -> `firstName`
    Camel,
}

impl NamingPolicy {
    /// Convert a property name into the column identifier this policy emits.
    pub fn column(&self, property: &str) -> String {
        match self {
            NamingPolicy::AsDeclared => property.to_string(),
            NamingPolicy::LowerSnake => to_snake(property),
            NamingPolicy::UpperSnake => to_snake(property).to_uppercase(),
            NamingPolicy::Camel => to_camel(property),
        }
    }
}

/// camelCase / PascalCase -> snake_case. Existing underscores pass through.
fn to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// snake_case -> camelCase. Names without underscores pass through.
fn to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            for upper in ch.to_uppercase() {
                out.push(upper);
            }
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
