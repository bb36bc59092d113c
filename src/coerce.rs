//! Type coercion: rewriting cells to match a column's schema type.
//!
//! Coercion is lossy and never fails on a per-value basis; a value that
//! cannot become the target type turns into the type's failure marker
//! (`NaN` for numbers, the invalid date for dates, `Null`/`Undefined` for
//! booleans and bigints). The only hard error is asking for a target that is
//! not a coercion target at all.
//!
//! Coercion is idempotent: feeding a coerced value back through the same
//! target is a no-op.

use crate::error::{EngineError, EngineResult};
use crate::types::{ColumnType, Row, Schema};
use crate::value::{date_from_millis, is_integer_valued, parse_date, Value};

/// Coerces one value to `target`.
///
/// `Null` and `Undefined` pass through untouched for every target except
/// `number`/`integer`, where they become `NaN`.
pub fn coerce_to_type(value: &Value, target: ColumnType) -> EngineResult<Value> {
    let coerced = match target {
        ColumnType::String => match value {
            Value::Str(_) | Value::Null | Value::Undefined => value.clone(),
            other => Value::Str(other.to_js_string()),
        },
        ColumnType::Boolean => match value {
            Value::Bool(_) | Value::Null | Value::Undefined => value.clone(),
            // Only the literal strings "true"/"false" convert; other strings
            // have no boolean reading and become null.
            Value::Str(s) => match s.trim().to_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            },
            other => Value::Bool(other.truthy()),
        },
        ColumnType::BigInt => match value {
            Value::BigInt(_) | Value::Null | Value::Undefined => value.clone(),
            other => {
                let numeric = match other {
                    Value::Str(s) if s.trim().is_empty() => f64::NAN,
                    _ => other.to_number(),
                };
                if !is_integer_valued(numeric) {
                    Value::Undefined
                } else if let Some(exact) = exact_integer_string(other) {
                    Value::BigInt(exact)
                } else if numeric.abs() <= i128::MAX as f64 {
                    Value::BigInt(numeric as i128)
                } else {
                    Value::Undefined
                }
            }
        },
        ColumnType::Integer | ColumnType::Number => match value {
            Value::Number(_) => value.clone(),
            Value::Null | Value::Undefined => Value::nan(),
            Value::Str(s) if s.trim().is_empty() => Value::nan(),
            other => Value::Number(other.to_number()),
        },
        ColumnType::Date => match value {
            Value::Date(_) | Value::Null | Value::Undefined => value.clone(),
            Value::Number(n) => Value::Date(date_from_millis(*n)),
            other => {
                let text = other.to_js_string();
                let trimmed = text.trim();
                if matches!(other, Value::Str(_)) && trimmed.is_empty() {
                    Value::Null
                } else {
                    // "Tried and failed": a non-blank value that does not
                    // parse becomes the invalid date, never null.
                    Value::Date(parse_date(trimmed))
                }
            }
        },
        ColumnType::Array | ColumnType::Object | ColumnType::Buffer | ColumnType::Other => {
            value.clone()
        }
        ColumnType::Raw => {
            return Err(EngineError::UnableToCoerce {
                type_name: target.as_str().to_owned(),
            });
        }
    };
    Ok(coerced)
}

/// Digit-for-digit integer parse for string inputs, keeping precision beyond
/// what `f64` can carry.
fn exact_integer_string(value: &Value) -> Option<i128> {
    match value {
        Value::Str(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

/// Coerces every cell of a row against the schema. Columns typed `raw` are
/// exempt and keep their values untouched.
pub fn coerce_row(row: &[Value], schema: &Schema) -> EngineResult<Row> {
    schema
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row.get(i).unwrap_or(&Value::Undefined);
            if column.column_type == ColumnType::Raw {
                Ok(value.clone())
            } else {
                coerce_to_type(value, column.column_type)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSchema;
    use chrono::{TimeZone, Utc};

    fn coerce(value: Value, target: ColumnType) -> Value {
        coerce_to_type(&value, target).unwrap()
    }

    #[test]
    fn strings_pass_through_and_others_stringify() {
        assert_eq!(coerce(Value::Str("x".into()), ColumnType::String), Value::Str("x".into()));
        assert_eq!(coerce(Value::Null, ColumnType::String), Value::Null);
        assert_eq!(coerce(Value::Number(1.5), ColumnType::String), Value::Str("1.5".into()));
        assert_eq!(coerce(Value::Bool(true), ColumnType::String), Value::Str("true".into()));
    }

    #[test]
    fn boolean_strings_must_be_literal() {
        assert_eq!(coerce(Value::Str(" TRUE ".into()), ColumnType::Boolean), Value::Bool(true));
        assert_eq!(coerce(Value::Str("false".into()), ColumnType::Boolean), Value::Bool(false));
        assert_eq!(coerce(Value::Str("yes".into()), ColumnType::Boolean), Value::Null);
        assert_eq!(coerce(Value::Number(0.0), ColumnType::Boolean), Value::Bool(false));
        assert_eq!(coerce(Value::nan(), ColumnType::Boolean), Value::Bool(false));
        assert_eq!(coerce(Value::invalid_date(), ColumnType::Boolean), Value::Bool(true));
    }

    #[test]
    fn numbers_use_nan_as_failure_marker() {
        assert_eq!(coerce(Value::Str("1e3".into()), ColumnType::Number), Value::Number(1000.0));
        assert!(matches!(coerce(Value::Null, ColumnType::Number), Value::Number(n) if n.is_nan()));
        assert!(matches!(coerce(Value::Str("  ".into()), ColumnType::Number), Value::Number(n) if n.is_nan()));
        assert!(matches!(coerce(Value::Str("abc".into()), ColumnType::Integer), Value::Number(n) if n.is_nan()));
        assert_eq!(coerce(Value::Bool(true), ColumnType::Integer), Value::Number(1.0));
    }

    #[test]
    fn bigint_requires_an_integer_reading() {
        assert_eq!(coerce(Value::Str("42".into()), ColumnType::BigInt), Value::BigInt(42));
        assert_eq!(coerce(Value::Number(-7.0), ColumnType::BigInt), Value::BigInt(-7));
        assert_eq!(coerce(Value::Str("1.5".into()), ColumnType::BigInt), Value::Undefined);
        assert_eq!(coerce(Value::Str("".into()), ColumnType::BigInt), Value::Undefined);
        assert_eq!(coerce(Value::Str("abc".into()), ColumnType::BigInt), Value::Undefined);
        assert_eq!(coerce(Value::Null, ColumnType::BigInt), Value::Null);
        // Digit strings keep full precision past f64's 2^53.
        assert_eq!(
            coerce(Value::Str("9007199254740993".into()), ColumnType::BigInt),
            Value::BigInt(9007199254740993)
        );
    }

    #[test]
    fn dates_distinguish_blank_from_unparseable() {
        let expected = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(coerce(Value::Str("2020-01-02".into()), ColumnType::Date), Value::date(expected));
        assert_eq!(coerce(Value::Str("   ".into()), ColumnType::Date), Value::Null);
        assert_eq!(coerce(Value::Str("not a date".into()), ColumnType::Date), Value::invalid_date());
        assert_eq!(coerce(Value::Number(1000.0), ColumnType::Date), Value::Date(Utc.timestamp_millis_opt(1000).single()));
        assert_eq!(coerce(Value::Number(f64::NAN), ColumnType::Date), Value::invalid_date());
        assert_eq!(coerce(Value::Null, ColumnType::Date), Value::Null);
    }

    #[test]
    fn container_targets_pass_through() {
        let array = Value::Array(vec![Value::Number(1.0)]);
        assert_eq!(coerce(array.clone(), ColumnType::Array), array);
        assert_eq!(coerce(Value::Str("x".into()), ColumnType::Object), Value::Str("x".into()));
        assert_eq!(coerce(Value::Number(1.0), ColumnType::Other), Value::Number(1.0));
    }

    #[test]
    fn raw_is_not_a_coercion_target() {
        assert!(matches!(
            coerce_to_type(&Value::Number(1.0), ColumnType::Raw),
            Err(EngineError::UnableToCoerce { .. })
        ));
    }

    #[test]
    fn coercion_is_idempotent() {
        let inputs = vec![
            Value::Str("2020-01-02".into()),
            Value::Str("abc".into()),
            Value::Str("42".into()),
            Value::Str("".into()),
            Value::Null,
            Value::Undefined,
            Value::Number(1.5),
            Value::Bool(true),
        ];
        for target in [
            ColumnType::Boolean,
            ColumnType::Integer,
            ColumnType::Number,
            ColumnType::Date,
            ColumnType::BigInt,
            ColumnType::String,
            ColumnType::Other,
        ] {
            for input in &inputs {
                let once = coerce_to_type(input, target).unwrap();
                let twice = coerce_to_type(&once, target).unwrap();
                assert_eq!(once, twice, "coercing {input:?} to {target} twice");
            }
        }
    }

    #[test]
    fn raw_columns_skip_row_coercion() {
        let schema = Schema::new(vec![
            ColumnSchema::new("a", ColumnType::Number),
            ColumnSchema::new("b", ColumnType::Raw),
        ]);
        let row = coerce_row(
            &[Value::Str("7".into()), Value::Str("7".into())],
            &schema,
        )
        .unwrap();
        assert_eq!(row, vec![Value::Number(7.0), Value::Str("7".into())]);
    }

    #[test]
    fn short_rows_read_missing_cells_as_undefined() {
        let schema = Schema::new(vec![
            ColumnSchema::new("a", ColumnType::String),
            ColumnSchema::new("b", ColumnType::Number),
        ]);
        let row = coerce_row(&[Value::Str("x".into())], &schema).unwrap();
        assert_eq!(row[0], Value::Str("x".into()));
        assert!(matches!(&row[1], Value::Number(n) if n.is_nan()));
    }
}
