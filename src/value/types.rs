//! `ValueType` trait for type-safe value conversions.
//!
//! `ValueType` maps Rust types to their corresponding [`Value`] variant.
//! Entities use it to hand property values to the binder and to take mapped
//! column values back out of result rows.
//!
//! Implemented for:
//!
//! - Integer types: `i8`, `i16`, `i32`, `i64`
//! - Floating point: `f32`, `f64`
//! - `bool`, `String`, `Vec<u8>`
//! - `rust_decimal::Decimal`, `uuid::Uuid`, `serde_json::Value`
//! - `chrono` date/time types
//! - `Option<T>` for all of the above

use super::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Maps a Rust type to its [`Value`] variant.
///
/// ## Example
///
/// ```
/// use gantry::value::{Value, ValueType};
///
/// let value = 42i32.into_value();
/// assert_eq!(value, Value::Int(Some(42)));
///
/// let back = i32::from_value(value);
/// assert_eq!(back, Some(42));
/// ```
pub trait ValueType: Sized {
    /// Convert this value into a [`Value`].
    fn into_value(self) -> Value;

    /// Convert a [`Value`] into this type.
    ///
    /// Returns `None` if the value is NULL or the wrong variant.
    fn from_value(value: Value) -> Option<Self>;

    /// The typed NULL for this type.
    ///
    /// Used by `Option<T>` to produce the right NULL variant for `None`.
    fn null_value() -> Value;
}

macro_rules! impl_value_type {
    ($rust:ty, $variant:ident) => {
        impl ValueType for $rust {
            fn into_value(self) -> Value {
                Value::$variant(Some(self))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => v,
                    _ => None,
                }
            }

            fn null_value() -> Value {
                Value::$variant(None)
            }
        }
    };
}

impl_value_type!(bool, Bool);
impl_value_type!(i8, TinyInt);
impl_value_type!(i16, SmallInt);
impl_value_type!(i32, Int);
impl_value_type!(i64, BigInt);
impl_value_type!(f32, Float);
impl_value_type!(f64, Double);
impl_value_type!(Decimal, Decimal);
impl_value_type!(String, String);
impl_value_type!(Vec<u8>, Bytes);
impl_value_type!(serde_json::Value, Json);
impl_value_type!(Uuid, Uuid);
impl_value_type!(NaiveDate, Date);
impl_value_type!(NaiveTime, Time);
impl_value_type!(NaiveDateTime, DateTime);
impl_value_type!(DateTime<Utc>, TimestampTz);

impl<T: ValueType> ValueType for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => T::null_value(),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            // A NULL of the right variant maps to Some(None); the wrong
            // variant still fails the conversion.
            let expected = std::mem::discriminant(&T::null_value());
            if std::mem::discriminant(&value) == expected {
                return Some(None);
            }
            return None;
        }
        T::from_value(value).map(Some)
    }

    fn null_value() -> Value {
        T::null_value()
    }
}
