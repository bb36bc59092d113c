//! Compiled row predicates for the in-memory filter step.

use std::cmp::Ordering;

use crate::operations::{FilterEntry, FilterOp, Operand};
use crate::types::{ColumnType, Row};
use crate::validate::{validator_for, TypeValidator};
use crate::value::{relational, strict_eq, Value};

/// One filter entry compiled against a column list: the column is resolved to
/// an index once, literals are extracted once, and the per-row test is a
/// plain match.
///
/// An unresolved column is not an error; every row then presents `Undefined`
/// to the test, mirroring how an absent field reads.
pub(crate) struct FilterPlan {
    column: Option<usize>,
    test: Test,
}

enum Test {
    Eq(Value),
    Ne(Value),
    /// Equality against a date operand compares numerically, by timestamp.
    EqTime(f64),
    NeTime(f64),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    NotContains(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    IsNull,
    IsNotNull,
    Valid(TypeValidator),
    NotValid(TypeValidator),
}

/// The raw value an operand contributes in a *value* position. A column
/// operand used as a value contributes its name as text.
fn operand_value(operand: &Operand) -> Value {
    match operand {
        Operand::Column(name) => Value::Str(name.clone()),
        Operand::Literal(value) => value.clone(),
    }
}

fn date_operand_millis(date: &Option<chrono::DateTime<chrono::Utc>>) -> f64 {
    date.map(|t| t.timestamp_millis() as f64)
        .unwrap_or(f64::NAN)
}

impl FilterPlan {
    pub(crate) fn compile(entry: &FilterEntry, columns: &[String]) -> FilterPlan {
        let column = match entry.operands.first() {
            Some(Operand::Column(name)) => columns.iter().position(|c| c == name),
            _ => None,
        };
        let literal = |i: usize| {
            entry
                .operands
                .get(i)
                .map(operand_value)
                .unwrap_or(Value::Undefined)
        };
        let test = match entry.op {
            FilterOp::Eq => match literal(1) {
                Value::Date(date) => Test::EqTime(date_operand_millis(&date)),
                value => Test::Eq(value),
            },
            FilterOp::Ne => match literal(1) {
                Value::Date(date) => Test::NeTime(date_operand_millis(&date)),
                value => Test::Ne(value),
            },
            FilterOp::Lt => Test::Lt(literal(1)),
            FilterOp::Lte => Test::Lte(literal(1)),
            FilterOp::Gt => Test::Gt(literal(1)),
            FilterOp::Gte => Test::Gte(literal(1)),
            FilterOp::Contains => Test::Contains(literal(1).to_js_string()),
            FilterOp::NotContains => Test::NotContains(literal(1).to_js_string()),
            FilterOp::In => Test::In(entry.operands[1..].iter().map(operand_value).collect()),
            FilterOp::NotIn => Test::NotIn(entry.operands[1..].iter().map(operand_value).collect()),
            FilterOp::IsNull => Test::IsNull,
            FilterOp::IsNotNull => Test::IsNotNull,
            FilterOp::IsValid => Test::Valid(type_validator(&literal(1))),
            FilterOp::IsNotValid => Test::NotValid(type_validator(&literal(1))),
        };
        FilterPlan { column, test }
    }

    pub(crate) fn matches(&self, row: &Row) -> bool {
        let cell = self
            .column
            .and_then(|i| row.get(i))
            .unwrap_or(&Value::Undefined);
        match &self.test {
            Test::Eq(value) => strict_eq(cell, value),
            Test::Ne(value) => !strict_eq(cell, value),
            Test::EqTime(time) => cell.to_number() == *time,
            Test::NeTime(time) => cell.to_number() != *time,
            Test::Lt(value) => relational(cell, value) == Some(Ordering::Less),
            Test::Lte(value) => matches!(
                relational(cell, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Test::Gt(value) => relational(cell, value) == Some(Ordering::Greater),
            Test::Gte(value) => matches!(
                relational(cell, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            // Substring tests only ever match string cells.
            Test::Contains(needle) => matches!(cell, Value::Str(s) if s.contains(needle)),
            Test::NotContains(needle) => matches!(cell, Value::Str(s) if !s.contains(needle)),
            Test::In(values) => values.iter().any(|v| v == cell),
            Test::NotIn(values) => !values.iter().any(|v| v == cell),
            Test::IsNull => cell.is_nullish(),
            Test::IsNotNull => !cell.is_nullish(),
            Test::Valid(validator) => validator(cell),
            Test::NotValid(validator) => !validator(cell),
        }
    }
}

/// Resolves the type-name operand of a `v`/`nv` filter to its validator.
/// Unrecognized names (and non-string operands) get the `other` validator.
fn type_validator(operand: &Value) -> TypeValidator {
    let column_type = match operand {
        Value::Str(name) => ColumnType::from_name(name),
        _ => ColumnType::Other,
    };
    validator_for(column_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::FilterEntry;

    fn plan(op: FilterOp, operands: Vec<Operand>) -> FilterPlan {
        FilterPlan::compile(&FilterEntry::new(op, operands), &["a".into(), "b".into()])
    }

    fn row(a: Value, b: Value) -> Row {
        vec![a, b]
    }

    #[test]
    fn strict_equality_does_not_coerce() {
        let p = plan(
            FilterOp::Eq,
            vec![Operand::column("a"), Operand::literal(1.0)],
        );
        assert!(p.matches(&row(Value::Number(1.0), Value::Null)));
        assert!(!p.matches(&row(Value::Str("1".into()), Value::Null)));
        assert!(!p.matches(&row(Value::nan(), Value::Null)));
    }

    #[test]
    fn date_operands_compare_by_timestamp() {
        use chrono::{TimeZone, Utc};
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let eq = plan(
            FilterOp::Eq,
            vec![Operand::column("a"), Operand::Literal(Value::date(t))],
        );
        assert!(eq.matches(&row(Value::date(t), Value::Null)));
        assert!(!eq.matches(&row(Value::invalid_date(), Value::Null)));
        let ne = plan(
            FilterOp::Ne,
            vec![Operand::column("a"), Operand::Literal(Value::date(t))],
        );
        assert!(!ne.matches(&row(Value::date(t), Value::Null)));
        assert!(ne.matches(&row(Value::invalid_date(), Value::Null)));
    }

    #[test]
    fn relational_filters_drop_unorderable_cells() {
        let p = plan(
            FilterOp::Gte,
            vec![Operand::column("a"), Operand::literal(10.0)],
        );
        assert!(p.matches(&row(Value::Number(10.0), Value::Null)));
        assert!(p.matches(&row(Value::Str("12".into()), Value::Null)));
        assert!(!p.matches(&row(Value::nan(), Value::Null)));
        assert!(!p.matches(&row(Value::Null, Value::Null)));
    }

    #[test]
    fn contains_only_matches_string_cells() {
        let p = plan(
            FilterOp::Contains,
            vec![Operand::column("a"), Operand::literal("an")],
        );
        assert!(p.matches(&row(Value::Str("banana".into()), Value::Null)));
        assert!(!p.matches(&row(Value::Number(1.0), Value::Null)));
        let n = plan(
            FilterOp::NotContains,
            vec![Operand::column("a"), Operand::literal("an")],
        );
        assert!(n.matches(&row(Value::Str("kiwi".into()), Value::Null)));
        // Neither test matches a non-string cell.
        assert!(!n.matches(&row(Value::Number(1.0), Value::Null)));
    }

    #[test]
    fn membership_uses_same_value_zero() {
        let p = plan(
            FilterOp::In,
            vec![
                Operand::column("a"),
                Operand::literal(1.0),
                Operand::Literal(Value::nan()),
            ],
        );
        assert!(p.matches(&row(Value::Number(1.0), Value::Null)));
        assert!(p.matches(&row(Value::nan(), Value::Null)));
        assert!(!p.matches(&row(Value::Number(2.0), Value::Null)));
    }

    #[test]
    fn null_tests_cover_both_null_likes() {
        let p = plan(FilterOp::IsNull, vec![Operand::column("a")]);
        assert!(p.matches(&row(Value::Null, Value::Null)));
        assert!(p.matches(&row(Value::Undefined, Value::Null)));
        assert!(!p.matches(&row(Value::nan(), Value::Null)));
    }

    #[test]
    fn validity_tests_take_a_type_name() {
        let p = plan(
            FilterOp::IsValid,
            vec![Operand::column("a"), Operand::literal("number")],
        );
        assert!(p.matches(&row(Value::Number(1.0), Value::Null)));
        assert!(!p.matches(&row(Value::nan(), Value::Null)));
        let nv = plan(
            FilterOp::IsNotValid,
            vec![Operand::column("a"), Operand::literal("date")],
        );
        assert!(nv.matches(&row(Value::invalid_date(), Value::Null)));
    }

    #[test]
    fn unknown_columns_read_as_undefined() {
        let p = plan(FilterOp::IsNull, vec![Operand::column("zzz")]);
        assert!(p.matches(&row(Value::Number(1.0), Value::Null)));
    }
}
