//! Dynamic value model shared by the SQL builder, binder and result mapper.
//!
//! [`Value`] is the engine's runtime representation of a column value: every
//! variant carries an `Option` so NULLs stay typed. Statements bind `Value`s,
//! rows hand them back, and entities move between the two through the
//! [`ValueType`] conversions.
//!
//! ## Modules
//!
//! - **`types`** - [`ValueType`] conversions between Rust types and `Value`
//! - **`tuple`** - [`ValueTuple`] composite-key wrapper used for join
//!   partitioning and cache keys

pub mod tuple;
pub mod types;

pub use tuple::ValueTuple;
pub use types::ValueType;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// A dynamically typed column value.
///
/// Each variant wraps an `Option` of the payload so a NULL keeps the column's
/// type. Values compare structurally; floating point payloads compare and
/// hash by bit pattern so a `Value` can serve as a lookup key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Option<bool>),
    TinyInt(Option<i8>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Float(Option<f32>),
    Double(Option<f64>),
    Decimal(Option<Decimal>),
    String(Option<String>),
    Bytes(Option<Vec<u8>>),
    Json(Option<serde_json::Value>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    DateTime(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
}

/// The type tag of a [`Value`], used by column specs to declare what a
/// column holds without holding a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    String,
    Bytes,
    Json,
    Uuid,
    Date,
    Time,
    DateTime,
    TimestampTz,
}

impl Value {
    /// True when the payload is NULL.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Bool(v) => v.is_none(),
            Value::TinyInt(v) => v.is_none(),
            Value::SmallInt(v) => v.is_none(),
            Value::Int(v) => v.is_none(),
            Value::BigInt(v) => v.is_none(),
            Value::Float(v) => v.is_none(),
            Value::Double(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::String(v) => v.is_none(),
            Value::Bytes(v) => v.is_none(),
            Value::Json(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::DateTime(v) => v.is_none(),
            Value::TimestampTz(v) => v.is_none(),
        }
    }

    /// The type tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::TinyInt(_) => ValueKind::TinyInt,
            Value::SmallInt(_) => ValueKind::SmallInt,
            Value::Int(_) => ValueKind::Int,
            Value::BigInt(_) => ValueKind::BigInt,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Json(_) => ValueKind::Json,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::TimestampTz(_) => ValueKind::TimestampTz,
        }
    }

    /// The typed NULL of the given kind.
    pub fn null_of(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Bool => Value::Bool(None),
            ValueKind::TinyInt => Value::TinyInt(None),
            ValueKind::SmallInt => Value::SmallInt(None),
            ValueKind::Int => Value::Int(None),
            ValueKind::BigInt => Value::BigInt(None),
            ValueKind::Float => Value::Float(None),
            ValueKind::Double => Value::Double(None),
            ValueKind::Decimal => Value::Decimal(None),
            ValueKind::String => Value::String(None),
            ValueKind::Bytes => Value::Bytes(None),
            ValueKind::Json => Value::Json(None),
            ValueKind::Uuid => Value::Uuid(None),
            ValueKind::Date => Value::Date(None),
            ValueKind::Time => Value::Time(None),
            ValueKind::DateTime => Value::DateTime(None),
            ValueKind::TimestampTz => Value::TimestampTz(None),
        }
    }
}

// Floats are keyed by bit pattern, everything else by payload, so `Value`
// can be a HashMap key (join partitioning, cache keys).
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(v) => v.hash(state),
            Value::TinyInt(v) => v.hash(state),
            Value::SmallInt(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::BigInt(v) => v.hash(state),
            Value::Float(v) => v.map(f32::to_bits).hash(state),
            Value::Double(v) => v.map(f64::to_bits).hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Json(v) => v.as_ref().map(ToString::to_string).hash(state),
            Value::Uuid(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::TimestampTz(v) => v.hash(state),
        }
    }
}

macro_rules! impl_value_from {
    ($rust:ty, $variant:ident) => {
        impl From<$rust> for Value {
            fn from(v: $rust) -> Self {
                Value::$variant(Some(v))
            }
        }

        impl From<Option<$rust>> for Value {
            fn from(v: Option<$rust>) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_value_from!(bool, Bool);
impl_value_from!(i8, TinyInt);
impl_value_from!(i16, SmallInt);
impl_value_from!(i32, Int);
impl_value_from!(i64, BigInt);
impl_value_from!(f32, Float);
impl_value_from!(f64, Double);
impl_value_from!(Decimal, Decimal);
impl_value_from!(String, String);
impl_value_from!(Vec<u8>, Bytes);
impl_value_from!(serde_json::Value, Json);
impl_value_from!(Uuid, Uuid);
impl_value_from!(NaiveDate, Date);
impl_value_from!(NaiveTime, Time);
impl_value_from!(NaiveDateTime, DateTime);
impl_value_from!(DateTime<Utc>, TimestampTz);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Some(v.to_string()))
    }
}
