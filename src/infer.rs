//! Schema inference: guessing a column type from a sample of its values.
//!
//! Inference reads at most the first [`SAMPLE_SIZE`] rows. For each column it
//! counts how many sampled values could belong to each candidate type, then
//! picks the first candidate (in a fixed priority order) that covers at least
//! 90% of the defined values. String is the fallback when no candidate
//! reaches the bar but the column held text; otherwise the column is `other`.
//!
//! Inference is deterministic: the same sample always produces the same
//! schema, and values past the sample never influence it.

use crate::types::{ColumnSchema, ColumnType, Schema, Table};
use crate::value::{date_pattern_matches, is_integer_valued, parse_number, Value};

/// Rows sampled per column when inferring types.
pub const SAMPLE_SIZE: usize = 100;

/// Candidate types in priority order. The first candidate whose count clears
/// the threshold wins, so `integer` beats `number` for whole-number columns
/// even though every integer also counts as a number.
const CANDIDATES: [ColumnType; 8] = [
    ColumnType::Boolean,
    ColumnType::Integer,
    ColumnType::Number,
    ColumnType::Date,
    ColumnType::BigInt,
    ColumnType::Array,
    ColumnType::Object,
    ColumnType::Buffer,
];

#[derive(Default)]
struct TypeCount {
    boolean: usize,
    integer: usize,
    number: usize,
    date: usize,
    bigint: usize,
    array: usize,
    object: usize,
    buffer: usize,
    string: usize,
    defined: usize,
}

impl TypeCount {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Null | Value::Undefined => return,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return;
                }
                self.defined += 1;
                self.string += 1;
                if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
                    self.boolean += 1;
                } else {
                    let numeric = parse_number(trimmed);
                    if !numeric.is_nan() {
                        self.number += 1;
                        if is_integer_valued(numeric) {
                            self.integer += 1;
                        }
                    } else if date_pattern_matches(trimmed) {
                        self.date += 1;
                    }
                }
            }
            other => {
                self.defined += 1;
                match other {
                    Value::Bool(_) => self.boolean += 1,
                    Value::Number(n) => {
                        // NaN still counts as a number: it is a failed numeric
                        // coercion, not a different type.
                        self.number += 1;
                        if is_integer_valued(*n) {
                            self.integer += 1;
                        }
                    }
                    Value::BigInt(_) => self.bigint += 1,
                    Value::Date(_) => self.date += 1,
                    Value::Array(_) => self.array += 1,
                    Value::Object(_) => self.object += 1,
                    Value::Buffer(_) => self.buffer += 1,
                    Value::Str(_) | Value::Null | Value::Undefined => {}
                }
            }
        }
    }

    fn count(&self, candidate: ColumnType) -> usize {
        match candidate {
            ColumnType::Boolean => self.boolean,
            ColumnType::Integer => self.integer,
            ColumnType::Number => self.number,
            ColumnType::Date => self.date,
            ColumnType::BigInt => self.bigint,
            ColumnType::Array => self.array,
            ColumnType::Object => self.object,
            ColumnType::Buffer => self.buffer,
            _ => 0,
        }
    }

    fn winner(&self) -> ColumnType {
        let threshold = f64::max(1.0, self.defined as f64 * 0.9);
        for candidate in CANDIDATES {
            if self.count(candidate) as f64 >= threshold {
                return candidate;
            }
        }
        if self.string > 0 {
            ColumnType::String
        } else {
            ColumnType::Other
        }
    }
}

/// Infers a schema for every column of `table` from its leading rows.
///
/// Each entry records the winner both as the column type and in `inferred`,
/// so later type assertions can override the former while the latter keeps
/// the sampled reading.
pub fn infer_schema(table: &Table) -> Schema {
    let sample = &table.rows()[..table.row_count().min(SAMPLE_SIZE)];
    let columns = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut counts = TypeCount::default();
            for row in sample {
                counts.add(row.get(i).unwrap_or(&Value::Undefined));
            }
            ColumnSchema::inferred(name.clone(), counts.winner())
        })
        .collect();
    Schema::new(columns)
}
