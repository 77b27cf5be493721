//! Composite-key value tuples.
//!
//! Simple keys are a single [`Value`]; composite keys are an ordered tuple of
//! them. [`ValueTuple`] covers both so primary keys and join keys share one
//! shape for lookup maps (join partitioning, cache keys).

use super::Value;

/// An ordered tuple of values keyed by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueTuple {
    One(Value),
    Two(Value, Value),
    Three(Value, Value, Value),
    Many(Vec<Value>),
}

impl ValueTuple {
    /// Build a tuple from an ordered value list.
    ///
    /// An empty list is not a key; callers validate arity before reaching
    /// this point.
    pub fn from_values(mut values: Vec<Value>) -> Self {
        match values.len() {
            1 => ValueTuple::One(values.remove(0)),
            2 => {
                let b = values.remove(1);
                let a = values.remove(0);
                ValueTuple::Two(a, b)
            }
            3 => {
                let c = values.remove(2);
                let b = values.remove(1);
                let a = values.remove(0);
                ValueTuple::Three(a, b, c)
            }
            _ => ValueTuple::Many(values),
        }
    }

    /// Number of values in the tuple.
    pub fn arity(&self) -> usize {
        match self {
            ValueTuple::One(_) => 1,
            ValueTuple::Two(_, _) => 2,
            ValueTuple::Three(_, _, _) => 3,
            ValueTuple::Many(v) => v.len(),
        }
    }

    /// The values in order.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            ValueTuple::One(a) => vec![a],
            ValueTuple::Two(a, b) => vec![a, b],
            ValueTuple::Three(a, b, c) => vec![a, b, c],
            ValueTuple::Many(v) => v,
        }
    }

    /// True when any component is NULL. A key with a NULL component never
    /// matches a related row, so loaders skip such roots.
    pub fn has_null(&self) -> bool {
        match self {
            ValueTuple::One(a) => a.is_null(),
            ValueTuple::Two(a, b) => a.is_null() || b.is_null(),
            ValueTuple::Three(a, b, c) => a.is_null() || b.is_null() || c.is_null(),
            ValueTuple::Many(v) => v.iter().any(Value::is_null),
        }
    }
}

impl From<Value> for ValueTuple {
    fn from(value: Value) -> Self {
        ValueTuple::One(value)
    }
}

macro_rules! impl_tuple_from {
    ($rust:ty) => {
        impl From<$rust> for ValueTuple {
            fn from(v: $rust) -> Self {
                ValueTuple::One(Value::from(v))
            }
        }
    };
}

impl_tuple_from!(i32);
impl_tuple_from!(i64);
impl_tuple_from!(String);
impl_tuple_from!(&str);
impl_tuple_from!(uuid::Uuid);
