//! Per-type validity predicates backing the `v`/`nv` filters.
//!
//! A validator answers "does this cell hold a real value of the asserted
//! type?", so `NaN` fails the number validator even though it *is* a number
//! variant, and the invalid date fails the date validator. The `other`
//! validator accepts anything non-null-like and doubles as the fallback for
//! unrecognized type names.

use crate::types::ColumnType;
use crate::value::{is_integer_valued, Value};

/// A validity predicate for one column type.
pub type TypeValidator = fn(&Value) -> bool;

pub fn is_valid_number(value: &Value) -> bool {
    matches!(value, Value::Number(n) if !n.is_nan())
}

pub fn is_valid_integer(value: &Value) -> bool {
    matches!(value, Value::Number(n) if is_integer_valued(*n))
}

pub fn is_valid_string(value: &Value) -> bool {
    matches!(value, Value::Str(_))
}

pub fn is_valid_boolean(value: &Value) -> bool {
    matches!(value, Value::Bool(_))
}

pub fn is_valid_bigint(value: &Value) -> bool {
    matches!(value, Value::BigInt(_))
}

pub fn is_valid_date(value: &Value) -> bool {
    matches!(value, Value::Date(Some(_)))
}

pub fn is_valid_buffer(value: &Value) -> bool {
    matches!(value, Value::Buffer(_))
}

pub fn is_valid_array(value: &Value) -> bool {
    matches!(value, Value::Array(_))
}

/// Anything object-like counts, including arrays, buffers, and dates (even
/// the invalid date, which is still a date object).
pub fn is_valid_object(value: &Value) -> bool {
    matches!(
        value,
        Value::Object(_) | Value::Array(_) | Value::Buffer(_) | Value::Date(_)
    )
}

/// Present at all: everything except `Null`/`Undefined`. `NaN` passes.
pub fn is_valid_other(value: &Value) -> bool {
    !value.is_nullish()
}

/// The validator for a column type. `Other` (and therefore any unrecognized
/// type name routed through [`ColumnType::from_name`]) gets the presence
/// check.
pub fn validator_for(column_type: ColumnType) -> TypeValidator {
    match column_type {
        ColumnType::Number => is_valid_number,
        ColumnType::Integer => is_valid_integer,
        ColumnType::String => is_valid_string,
        ColumnType::Boolean => is_valid_boolean,
        ColumnType::BigInt => is_valid_bigint,
        ColumnType::Date => is_valid_date,
        ColumnType::Buffer => is_valid_buffer,
        ColumnType::Array => is_valid_array,
        ColumnType::Object => is_valid_object,
        ColumnType::Other | ColumnType::Raw => is_valid_other,
    }
}
