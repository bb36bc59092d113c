//! Column schemas and the in-memory table shape.
//!
//! Every row set the engine handles is a [`Table`]: a column-name list plus
//! rows of [`Value`]s aligned to it, with an optional [`Schema`] describing
//! the column types. Sources that arrive as JSON objects or bare scalars are
//! normalized into this shape up front, so the rest of the engine never deals
//! with ragged rows.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::value::Value;

/// One row of cells, aligned to the owning table's column list.
pub type Row = Vec<Value>;

/// Number of leading values inspected when classifying a raw JSON row set.
const CLASSIFY_SAMPLE: usize = 20;

/// Column name used when a source is a bare list of scalars.
pub const VALUE_COLUMN: &str = "value";

/// The semantic type of a column.
///
/// `Raw` is an escape hatch: a column asserted as `raw` is exempt from
/// coercion and keeps its values untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Number,
    Date,
    BigInt,
    String,
    Array,
    Object,
    Buffer,
    Other,
    Raw,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::BigInt => "bigint",
            ColumnType::String => "string",
            ColumnType::Array => "array",
            ColumnType::Object => "object",
            ColumnType::Buffer => "buffer",
            ColumnType::Other => "other",
            ColumnType::Raw => "raw",
        }
    }

    /// Maps a type name to a column type, defaulting to `Other` for anything
    /// unrecognized. Validity filters rely on the default instead of erroring.
    pub fn from_name(name: &str) -> ColumnType {
        match name {
            "boolean" => ColumnType::Boolean,
            "integer" => ColumnType::Integer,
            "number" => ColumnType::Number,
            "date" => ColumnType::Date,
            "bigint" => ColumnType::BigInt,
            "string" => ColumnType::String,
            "array" => ColumnType::Array,
            "object" => ColumnType::Object,
            "buffer" => ColumnType::Buffer,
            "raw" => ColumnType::Raw,
            _ => ColumnType::Other,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column's schema entry.
///
/// `inferred` is set when the type came from sampling the data rather than
/// from the source or a user assertion; the original inference survives later
/// type overrides so a UI can still show what the data looked like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred: Option<ColumnType>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSchema {
            name: name.into(),
            column_type,
            inferred: None,
        }
    }

    pub fn inferred(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSchema {
            name: name.into(),
            column_type,
            inferred: Some(column_type),
        }
    }
}

/// An ordered list of column schema entries.
///
/// Serializes as a plain array, which is also the wire shape database clients
/// use when they report a result-set schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Schema { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnSchema> {
        self.columns.iter()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// An in-memory row set: column names plus rows aligned to them.
///
/// Fields a source row did not carry are filled with [`Value::Undefined`], so
/// every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
    schema: Option<Schema>,
}

impl Table {
    /// Builds a table from columns and aligned rows.
    ///
    /// # Panics
    ///
    /// Panics if any row's length differs from the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        for row in &rows {
            assert_eq!(
                row.len(),
                columns.len(),
                "row width must match column count"
            );
        }
        Table {
            columns,
            rows,
            schema: None,
        }
    }

    /// Builds a table whose columns come from a known schema.
    ///
    /// # Panics
    ///
    /// Panics if any row's length differs from the schema's column count.
    pub fn with_schema(schema: Schema, rows: Vec<Row>) -> Self {
        let columns = schema.names();
        let mut table = Table::new(columns, rows);
        table.schema = Some(schema);
        table
    }

    pub fn empty() -> Self {
        Table {
            columns: Vec::new(),
            rows: Vec::new(),
            schema: None,
        }
    }

    /// Normalizes a list of keyed rows. Columns are the union of all row keys
    /// in first-seen order; missing fields become `Undefined`. A `Null` entry
    /// in the list contributes no keys and yields an all-`Undefined` row.
    pub fn from_objects(objects: Vec<Value>) -> EngineResult<Table> {
        let mut columns: Vec<String> = Vec::new();
        for object in &objects {
            match object {
                Value::Object(pairs) => {
                    for (name, _) in pairs {
                        if !columns.iter().any(|c| c == name) {
                            columns.push(name.clone());
                        }
                    }
                }
                Value::Null | Value::Undefined => {}
                _ => return Err(EngineError::InvalidDataSource),
            }
        }
        let rows = objects
            .into_iter()
            .map(|object| match object {
                Value::Object(mut pairs) => columns
                    .iter()
                    .map(|column| {
                        pairs
                            .iter_mut()
                            .find(|(name, _)| name == column)
                            .map(|(_, value)| std::mem::replace(value, Value::Undefined))
                            .unwrap_or(Value::Undefined)
                    })
                    .collect(),
                _ => vec![Value::Undefined; columns.len()],
            })
            .collect();
        Ok(Table {
            columns,
            rows,
            schema: None,
        })
    }

    /// Wraps a list of scalars as a single-column table named
    /// [`VALUE_COLUMN`].
    pub fn from_values(values: Vec<Value>) -> Table {
        let rows = values.into_iter().map(|v| vec![v]).collect();
        Table {
            columns: vec![VALUE_COLUMN.to_owned()],
            rows,
            schema: None,
        }
    }

    /// Classifies and normalizes a raw JSON array.
    ///
    /// The first few entries decide the shape: all objects (or nulls) make a
    /// keyed table, all scalars make a single-column table, anything mixed is
    /// rejected as an invalid data source.
    pub fn from_json_rows(json: &[serde_json::Value]) -> EngineResult<Table> {
        let values: Vec<Value> = json.iter().map(Value::from_json).collect();
        Table::from_value_rows(values)
    }

    /// [`Table::from_json_rows`] for already-converted values.
    pub fn from_value_rows(values: Vec<Value>) -> EngineResult<Table> {
        let sample = &values[..values.len().min(CLASSIFY_SAMPLE)];
        let objects = sample
            .iter()
            .all(|v| matches!(v, Value::Object(_) | Value::Null | Value::Undefined));
        let has_object = sample.iter().any(|v| matches!(v, Value::Object(_)));
        if objects && has_object {
            return Table::from_objects(values);
        }
        let primitives = !sample.is_empty()
            && sample.iter().all(|v| {
                matches!(
                    v,
                    Value::Number(_) | Value::Str(_) | Value::Bool(_) | Value::Date(_)
                )
            });
        if primitives {
            return Ok(Table::from_values(values));
        }
        if values.is_empty() {
            return Ok(Table::empty());
        }
        Err(EngineError::InvalidDataSource)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The cell at (`row`, `column`), or `Undefined` when out of range.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        self.column_index(column)
            .and_then(|i| self.rows.get(row).and_then(|r| r.get(i)))
            .unwrap_or(&Value::Undefined)
    }

    pub fn set_schema(&mut self, schema: Option<Schema>) {
        self.schema = schema;
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>, Option<Schema>) {
        (self.columns, self.rows, self.schema)
    }
}
