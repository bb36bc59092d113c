//! Dynamic cell values and the conversion rules shared by the whole engine.
//!
//! A [`Value`] is one cell of a row. The variants cover everything the supported
//! sources can produce: JSON scalars, CSV text, timestamps, byte buffers, and
//! nested arrays/objects. Two null-like variants are kept distinct on purpose:
//! `Null` is an explicit null from the source, `Undefined` is an absent field.
//!
//! The free functions in this module implement the loose conversion rules the
//! operation set is specified against: numeric parsing that accepts hex/octal/
//! binary literals and signed infinities, date parsing restricted to a fixed
//! grammar, and relational comparison that orders mixed types numerically and
//! strings lexicographically.
//!
//! ```
//! use table_query_engine::Value;
//!
//! assert_eq!(Value::Str("1e3".into()).to_number(), 1000.0);
//! assert!(Value::Str("three".into()).to_number().is_nan());
//! assert_eq!(Value::Null.to_js_string(), "null");
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Deserializer, Serialize};

/// Largest timestamp magnitude (in milliseconds) a date may hold.
///
/// Timestamps beyond this range collapse to the invalid date.
pub(crate) const MAX_DATE_MILLIS: f64 = 8.64e15;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// One cell of a row.
///
/// `Date(None)` is the *invalid date*: a value that was recognized as a date but
/// failed to parse into a real timestamp. It is distinct from `Null` so that a
/// failed date coercion stays observable downstream.
#[derive(Debug, Clone)]
pub enum Value {
    /// Explicit null from the source.
    Null,
    /// Absent field (the row did not have this column).
    Undefined,
    Bool(bool),
    /// Double-precision number. `NaN` marks a failed numeric coercion.
    Number(f64),
    /// Wide integer column value, `i128`-backed.
    BigInt(i128),
    Str(String),
    /// A timestamp, or `None` for the invalid date.
    Date(Option<DateTime<Utc>>),
    Array(Vec<Value>),
    /// Object with insertion-ordered fields.
    Object(Vec<(String, Value)>),
    /// Raw binary payload.
    Buffer(Vec<u8>),
}

/// Structural equality with `NaN` equal to itself and invalid dates equal to
/// each other (SameValueZero). Used by set-membership filters; strict filter
/// equality lives in [`strict_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Buffer(a), Value::Buffer(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// A valid date value.
    pub fn date(datetime: DateTime<Utc>) -> Self {
        Value::Date(Some(datetime))
    }

    /// The invalid date: recognized as a date, but not a real timestamp.
    pub fn invalid_date() -> Self {
        Value::Date(None)
    }

    /// The failed-numeric-coercion marker.
    pub fn nan() -> Self {
        Value::Number(f64::NAN)
    }

    /// True for `Null` and `Undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// True for the values that sort last under every direction: `Null`,
    /// `Undefined`, `NaN`, and the invalid date.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null | Value::Undefined | Value::Date(None) => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Loose truthiness: empty strings, zero, `NaN`, and null-likes are false;
    /// containers and dates (even the invalid date) are true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) | Value::Array(_) | Value::Object(_) | Value::Buffer(_) => true,
        }
    }

    /// Loose numeric conversion.
    ///
    /// - `Null` is 0, `Undefined` is `NaN`.
    /// - Strings go through [`parse_number`], with the empty string mapping to 0.
    /// - Valid dates convert to their epoch-millisecond timestamp.
    /// - Arrays stringify first; objects and buffers are `NaN`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Undefined => f64::NAN,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::BigInt(i) => *i as f64,
            Value::Str(s) => parse_number(s),
            Value::Date(Some(t)) => t.timestamp_millis() as f64,
            Value::Date(None) => f64::NAN,
            Value::Array(_) => parse_number(&self.to_js_string()),
            Value::Object(_) | Value::Buffer(_) => f64::NAN,
        }
    }

    /// Loose string conversion.
    ///
    /// Valid dates render as ISO-8601 with millisecond precision; the invalid
    /// date renders as `"Invalid Date"`. Arrays join their elements with commas
    /// (null-likes become empty); objects and buffers render as opaque tags.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Undefined => "undefined".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::BigInt(i) => i.to_string(),
            Value::Str(s) => s.clone(),
            Value::Date(Some(t)) => t.format(ISO_FORMAT).to_string(),
            Value::Date(None) => "Invalid Date".to_owned(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null | Value::Undefined => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_owned(),
            Value::Buffer(_) => "[object ArrayBuffer]".to_owned(),
        }
    }

    /// Converts a parsed JSON value. JSON numbers always become `Number`, never
    /// `BigInt`; object field order is preserved.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Converts to a JSON value. `Undefined`, `NaN`, infinities, and the
    /// invalid date all collapse to JSON null; buffers become number arrays;
    /// bigints outside `i64` render as strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Undefined | Value::Date(None) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::BigInt(i) => match i64::try_from(*i) {
                Ok(v) => serde_json::Value::Number(v.into()),
                Err(_) => serde_json::Value::String(i.to_string()),
            },
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Date(Some(t)) => serde_json::Value::String(t.format(ISO_FORMAT).to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(pairs) => serde_json::Value::Object(
                pairs
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Buffer(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| (*b).into()).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Date(Some(t))
    }
}

/// Loose numeric parsing for strings.
///
/// Accepts decimal and scientific notation, `0x`/`0o`/`0b` prefixed integers,
/// and signed `Infinity`. Blank input is 0; anything else unparseable is `NaN`.
pub(crate) fn parse_number(text: &str) -> f64 {
    let t = text.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return radix_number(hex, 16);
    }
    if let Some(oct) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        return radix_number(oct, 8);
    }
    if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        return radix_number(bin, 2);
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Reject the spellings Rust's float parser accepts but the loose grammar
    // does not ("inf", "NaN", hex floats).
    if t.bytes()
        .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

fn radix_number(digits: &str, radix: u32) -> f64 {
    match u128::from_str_radix(digits, radix) {
        Ok(v) => v as f64,
        Err(_) => f64::NAN,
    }
}

/// Renders a number the way the loose string conversion does: no trailing
/// `.0`, negative zero as `"0"`, and named infinities.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n == f64::INFINITY {
        "Infinity".to_owned()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

/// True when `n` holds an integer (finite with no fractional part).
pub(crate) fn is_integer_valued(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0
}

struct DateParts {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    milli: u32,
    offset_minutes: Option<i32>,
}

struct DateScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DateScanner<'a> {
    fn new(text: &'a str) -> Self {
        DateScanner {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Consumes between `min` and `max` digits, greedily, returning the value
    /// and the digit count. Fails without advancing when fewer than `min`
    /// digits are available.
    fn digits(&mut self, min: usize, max: usize) -> Option<(u32, usize)> {
        let mut count = 0;
        let mut value: u32 = 0;
        while count < max {
            match self.bytes.get(self.pos + count) {
                Some(b) if b.is_ascii_digit() => {
                    value = value * 10 + u32::from(b - b'0');
                    count += 1;
                }
                _ => break,
            }
        }
        if count < min {
            return None;
        }
        self.pos += count;
        Some((value, count))
    }
}

/// Tokenizes a candidate date string against the recognized grammar without
/// range-checking the fields. Two date shapes are accepted:
///
/// - ISO: optional sign plus expanded year, then full `YYYY-MM-DD` (a bare
///   year or year-month is *not* a date),
/// - slash: `M/D/YY` or `M/D/YYYY`.
///
/// Either may carry a time part, `T` or space separated: `HH:MM`, optional
/// `:SS`, optional `.mmm`, optional `Z` or `±HH:MM` zone.
fn scan_date_parts(text: &str) -> Option<DateParts> {
    let mut s = DateScanner::new(text);
    let (year, month, day) = match s.peek()? {
        sign @ (b'+' | b'-') => {
            s.pos += 1;
            let (year, _) = s.digits(6, 6)?;
            let year = if sign == b'-' {
                -(year as i32)
            } else {
                year as i32
            };
            if !s.eat(b'-') {
                return None;
            }
            let (month, _) = s.digits(2, 2)?;
            if !s.eat(b'-') {
                return None;
            }
            let (day, _) = s.digits(2, 2)?;
            (year, month, day)
        }
        _ => {
            let (first, first_len) = s.digits(1, 4)?;
            match s.peek() {
                Some(b'-') if first_len == 4 => {
                    s.pos += 1;
                    let (month, _) = s.digits(2, 2)?;
                    if !s.eat(b'-') {
                        return None;
                    }
                    let (day, _) = s.digits(2, 2)?;
                    (first as i32, month, day)
                }
                Some(b'/') if first_len <= 2 => {
                    s.pos += 1;
                    let (day, _) = s.digits(1, 2)?;
                    if !s.eat(b'/') {
                        return None;
                    }
                    let (year, year_len) = s.digits(2, 4)?;
                    let year = if year_len <= 2 {
                        // Two-digit years pivot at 50.
                        if year < 50 {
                            2000 + year as i32
                        } else {
                            1900 + year as i32
                        }
                    } else {
                        year as i32
                    };
                    (year, first, day)
                }
                _ => return None,
            }
        }
    };

    let mut parts = DateParts {
        year,
        month,
        day,
        hour: 0,
        minute: 0,
        second: 0,
        milli: 0,
        offset_minutes: None,
    };
    if s.done() {
        return Some(parts);
    }
    if !s.eat(b'T') && !s.eat(b' ') {
        return None;
    }
    parts.hour = s.digits(2, 2)?.0;
    if !s.eat(b':') {
        return None;
    }
    parts.minute = s.digits(2, 2)?.0;
    if s.eat(b':') {
        parts.second = s.digits(2, 2)?.0;
        if s.eat(b'.') {
            parts.milli = s.digits(3, 3)?.0;
        }
    }
    match s.peek() {
        None => {}
        Some(b'Z') => {
            s.pos += 1;
            parts.offset_minutes = Some(0);
        }
        Some(sign @ (b'+' | b'-')) => {
            s.pos += 1;
            let hours = s.digits(2, 2)?.0 as i32;
            if !s.eat(b':') {
                return None;
            }
            let minutes = s.digits(2, 2)?.0 as i32;
            let offset = hours * 60 + minutes;
            parts.offset_minutes = Some(if sign == b'-' { -offset } else { offset });
        }
        Some(_) => return None,
    }
    if !s.done() {
        return None;
    }
    Some(parts)
}

/// True when the string matches the date grammar, regardless of whether the
/// fields are in range. Schema inference counts on this (a syntactic date that
/// fails range checks still *looks* like a date).
pub(crate) fn date_pattern_matches(text: &str) -> bool {
    scan_date_parts(text).is_some()
}

/// Parses a string into a timestamp, returning `None` when the grammar does
/// not match or a field is out of range. Zoneless inputs are taken as UTC.
pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let parts = scan_date_parts(text)?;
    let date = NaiveDate::from_ymd_opt(parts.year, parts.month, parts.day)?;
    let mut naive = date.and_hms_milli_opt(parts.hour, parts.minute, parts.second, parts.milli)?;
    if let Some(offset) = parts.offset_minutes {
        naive -= Duration::minutes(i64::from(offset));
    }
    let datetime = Utc.from_utc_datetime(&naive);
    if (datetime.timestamp_millis() as f64).abs() > MAX_DATE_MILLIS {
        return None;
    }
    Some(datetime)
}

/// Converts an epoch-millisecond number to a timestamp, truncating any
/// fractional part. Out-of-range and non-finite inputs yield `None`.
pub(crate) fn date_from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    let ms = ms.trunc();
    if ms.abs() > MAX_DATE_MILLIS {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

enum Prim {
    Text(String),
    Num(f64),
    Big(i128),
}

fn to_prim(value: &Value) -> Prim {
    match value {
        Value::Str(s) => Prim::Text(s.clone()),
        Value::Number(n) => Prim::Num(*n),
        Value::BigInt(i) => Prim::Big(*i),
        Value::Bool(b) => Prim::Num(if *b { 1.0 } else { 0.0 }),
        Value::Null => Prim::Num(0.0),
        Value::Undefined => Prim::Num(f64::NAN),
        Value::Date(Some(t)) => Prim::Num(t.timestamp_millis() as f64),
        Value::Date(None) => Prim::Num(f64::NAN),
        Value::Array(_) | Value::Object(_) | Value::Buffer(_) => Prim::Text(value.to_js_string()),
    }
}

fn prim_number(prim: &Prim) -> f64 {
    match prim {
        Prim::Text(t) => parse_number(t),
        Prim::Num(n) => *n,
        Prim::Big(i) => *i as f64,
    }
}

/// Loose relational comparison. Two strings compare lexicographically;
/// everything else compares numerically after conversion (containers through
/// their string form). `None` means unordered: at least one side converted to
/// `NaN`, so every relational filter on it is false.
pub(crate) fn relational(a: &Value, b: &Value) -> Option<Ordering> {
    match (to_prim(a), to_prim(b)) {
        (Prim::Text(x), Prim::Text(y)) => Some(x.cmp(&y)),
        (Prim::Big(x), Prim::Big(y)) => Some(x.cmp(&y)),
        (x, y) => prim_number(&x).partial_cmp(&prim_number(&y)),
    }
}

/// Strict equality for the `eq`/`ne` filters: no cross-type coercion, `NaN`
/// equal to nothing, invalid dates equal to nothing, and container values
/// never equal (distinct rows hold distinct containers).
pub(crate) fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Date(Some(x)), Value::Date(Some(y))) => x == y,
        (Value::Date(_), Value::Date(_)) => false,
        (Value::Array(_), _)
        | (_, Value::Array(_))
        | (Value::Object(_), _)
        | (_, Value::Object(_))
        | (Value::Buffer(_), _)
        | (_, Value::Buffer(_)) => false,
        _ => a == b,
    }
}

/// Ascending comparator that sorts missing values ([`Value::is_missing`])
/// after every present value. Unorderable pairs compare equal, which keeps
/// the surrounding stable sort from moving them.
pub fn ascending_defined(a: &Value, b: &Value) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => relational(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Descending counterpart of [`ascending_defined`]; missing values still sort
/// last.
pub fn descending_defined(a: &Value, b: &Value) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => relational(b, a).unwrap_or(Ordering::Equal),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Undefined | Value::Date(None) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_nan() || n.is_infinite() => serializer.serialize_unit(),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::BigInt(i) => match i64::try_from(*i) {
                Ok(v) => serializer.serialize_i64(v),
                Err(_) => serializer.collect_str(i),
            },
            Value::Str(s) => serializer.serialize_str(s),
            Value::Date(Some(t)) => serializer.collect_str(&t.format(ISO_FORMAT)),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Object(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (name, value) in pairs {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Buffer(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                Value::deserialize(deserializer)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Number(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Number(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Number(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Str(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
                Ok(Value::Str(v))
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
                Ok(Value::Buffer(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
                Ok(Value::Buffer(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let mut pairs = Vec::new();
                while let Some(entry) = map.next_entry::<String, Value>()? {
                    pairs.push(entry);
                }
                Ok(Value::Object(pairs))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_decimal_and_scientific_numbers() {
        assert_eq!(parse_number("42"), 42.0);
        assert_eq!(parse_number("  -3.5  "), -3.5);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number("2.5E-2"), 0.025);
        assert_eq!(parse_number("+.5"), 0.5);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("   "), 0.0);
    }

    #[test]
    fn parses_radix_prefixes_and_infinities() {
        assert_eq!(parse_number("0x10"), 16.0);
        assert_eq!(parse_number("0o17"), 15.0);
        assert_eq!(parse_number("0b101"), 5.0);
        assert_eq!(parse_number("Infinity"), f64::INFINITY);
        assert_eq!(parse_number("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_number("0x").is_nan());
        assert!(parse_number("-0x10").is_nan());
    }

    #[test]
    fn rejects_rust_float_spellings() {
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("NaN").is_nan());
        assert!(parse_number("nan").is_nan());
        assert!(parse_number("three").is_nan());
        assert!(parse_number("1,000").is_nan());
    }

    #[test]
    fn formats_numbers_without_trailing_zero() {
        assert_eq!(Value::Number(10.0).to_js_string(), "10");
        assert_eq!(Value::Number(-0.0).to_js_string(), "0");
        assert_eq!(Value::Number(1.5).to_js_string(), "1.5");
        assert_eq!(Value::Number(f64::NAN).to_js_string(), "NaN");
        assert_eq!(Value::Number(f64::INFINITY).to_js_string(), "Infinity");
    }

    #[test]
    fn stringifies_containers_loosely() {
        let array = Value::Array(vec![Value::Number(1.0), Value::Null, Value::Str("x".into())]);
        assert_eq!(array.to_js_string(), "1,,x");
        assert_eq!(Value::Object(vec![]).to_js_string(), "[object Object]");
        assert_eq!(Value::Buffer(vec![1]).to_js_string(), "[object ArrayBuffer]");
        assert_eq!(Value::invalid_date().to_js_string(), "Invalid Date");
    }

    #[test]
    fn numeric_conversion_follows_loose_rules() {
        assert_eq!(Value::Null.to_number(), 0.0);
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert_eq!(Value::Str("  7 ".into()).to_number(), 7.0);
        assert_eq!(Value::Array(vec![Value::Number(9.0)]).to_number(), 9.0);
        assert!(Value::Object(vec![]).to_number().is_nan());
        assert_eq!(Value::date(utc(1970, 1, 1, 0, 0, 1)).to_number(), 1000.0);
    }

    #[test]
    fn accepts_full_iso_dates_only() {
        assert_eq!(parse_date("2020-01-02"), Some(utc(2020, 1, 2, 0, 0, 0)));
        assert_eq!(
            parse_date("2020-01-02T03:04:05Z"),
            Some(utc(2020, 1, 2, 3, 4, 5))
        );
        assert_eq!(
            parse_date("2020-01-02 03:04"),
            Some(utc(2020, 1, 2, 3, 4, 0))
        );
        // A bare year or year-month is not a date.
        assert_eq!(parse_date("2020"), None);
        assert_eq!(parse_date("2020-01"), None);
        assert_eq!(parse_date("20200102"), None);
    }

    #[test]
    fn accepts_slash_dates_with_two_digit_year_pivot() {
        assert_eq!(parse_date("1/2/2020"), Some(utc(2020, 1, 2, 0, 0, 0)));
        assert_eq!(parse_date("01/02/20"), Some(utc(2020, 1, 2, 0, 0, 0)));
        assert_eq!(parse_date("1/2/49"), Some(utc(2049, 1, 2, 0, 0, 0)));
        assert_eq!(parse_date("1/2/50"), Some(utc(1950, 1, 2, 0, 0, 0)));
        assert_eq!(parse_date("123/4/56"), None);
    }

    #[test]
    fn applies_zone_offsets() {
        assert_eq!(
            parse_date("2020-01-02T00:30+01:00"),
            Some(utc(2020, 1, 1, 23, 30, 0))
        );
        assert_eq!(
            parse_date("2020-01-01T23:30-02:30"),
            Some(utc(2020, 1, 2, 2, 0, 0))
        );
        assert_eq!(
            parse_date("2020-01-02T03:04:05.250Z"),
            Utc.timestamp_millis_opt(1577934245250).single()
        );
    }

    #[test]
    fn pattern_match_is_wider_than_validity() {
        // Syntactically a date, but out of range: parses to nothing while
        // still matching the grammar.
        assert!(date_pattern_matches("99/99/9999"));
        assert_eq!(parse_date("99/99/9999"), None);
        assert!(date_pattern_matches("2020-13-45"));
        assert_eq!(parse_date("2020-13-45"), None);
        assert!(!date_pattern_matches("yesterday"));
        assert!(!date_pattern_matches("2020-01-02X"));
        assert!(!date_pattern_matches("1:00"));
    }

    #[test]
    fn millisecond_conversion_clamps_range() {
        assert_eq!(
            date_from_millis(0.0),
            Some(utc(1970, 1, 1, 0, 0, 0))
        );
        assert_eq!(date_from_millis(100.7).map(|t| t.timestamp_millis()), Some(100));
        assert_eq!(date_from_millis(8.64e15 + 1.0), None);
        assert_eq!(date_from_millis(f64::NAN), None);
        assert_eq!(date_from_millis(f64::INFINITY), None);
    }

    #[test]
    fn strict_equality_has_no_coercion() {
        assert!(strict_eq(&Value::Number(1.0), &Value::Number(1.0)));
        assert!(!strict_eq(&Value::Number(1.0), &Value::Str("1".into())));
        assert!(!strict_eq(&Value::nan(), &Value::nan()));
        assert!(!strict_eq(&Value::Null, &Value::Undefined));
        assert!(!strict_eq(&Value::invalid_date(), &Value::invalid_date()));
        assert!(strict_eq(
            &Value::date(utc(2020, 1, 1, 0, 0, 0)),
            &Value::date(utc(2020, 1, 1, 0, 0, 0))
        ));
        assert!(!strict_eq(&Value::Array(vec![]), &Value::Array(vec![])));
    }

    #[test]
    fn structural_equality_matches_nan_and_invalid_dates() {
        assert_eq!(Value::nan(), Value::nan());
        assert_eq!(Value::invalid_date(), Value::invalid_date());
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn comparators_sort_missing_last() {
        let mut values = vec![
            Value::Number(20.0),
            Value::Null,
            Value::nan(),
            Value::Number(1.0),
            Value::Undefined,
            Value::Number(10.0),
        ];
        values.sort_by(ascending_defined);
        assert_eq!(values[0], Value::Number(1.0));
        assert_eq!(values[1], Value::Number(10.0));
        assert_eq!(values[2], Value::Number(20.0));
        assert!(values[3..].iter().all(Value::is_missing));

        values.sort_by(descending_defined);
        assert_eq!(values[0], Value::Number(20.0));
        assert_eq!(values[2], Value::Number(1.0));
        assert!(values[3..].iter().all(Value::is_missing));
    }

    #[test]
    fn relational_mixes_types_numerically() {
        assert_eq!(
            relational(&Value::Str("2".into()), &Value::Number(10.0)),
            Some(Ordering::Less)
        );
        // Two strings compare lexicographically instead.
        assert_eq!(
            relational(&Value::Str("2".into()), &Value::Str("10".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(
            relational(&Value::Str("abc".into()), &Value::Number(1.0)),
            None
        );
        assert_eq!(
            relational(&Value::BigInt(2), &Value::BigInt(10)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn serializes_to_json_shapes() {
        assert_eq!(serde_json::to_string(&Value::Undefined).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::nan()).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::invalid_date()).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::Number(1.5)).unwrap(), "1.5");
        assert_eq!(
            serde_json::to_string(&Value::date(utc(2020, 1, 2, 0, 0, 0))).unwrap(),
            "\"2020-01-02T00:00:00.000Z\""
        );
        let row: Value = serde_json::from_str(r#"{"a": 1, "b": [null, "x"]}"#).unwrap();
        assert_eq!(
            row,
            Value::Object(vec![
                ("a".into(), Value::Number(1.0)),
                (
                    "b".into(),
                    Value::Array(vec![Value::Null, Value::Str("x".into())])
                ),
            ])
        );
    }
}
