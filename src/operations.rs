//! The declarative operation set describing a query over a data source.
//!
//! An [`Operations`] value is the engine's input contract: projection,
//! filtering, sorting, slicing, renames, type assertions, and (in-memory only)
//! derived columns. It deserializes from the JSON shape produced by table
//! editors:
//!
//! ```
//! use table_query_engine::operations::{FilterOp, Operations};
//!
//! let operations: Operations = serde_json::from_str(
//!     r#"{
//!         "select": {"columns": ["a", "b"]},
//!         "from": {"table": "data"},
//!         "filter": [{"type": "gte", "operands": [
//!             {"type": "column", "value": "a"},
//!             {"type": "primitive", "value": 10}
//!         ]}],
//!         "sort": [{"column": "b", "direction": "desc"}],
//!         "slice": {"from": 0, "to": 100}
//!     }"#,
//! )?;
//! assert_eq!(operations.filter[0].op, FilterOp::Gte);
//! # Ok::<(), serde_json::Error>(())
//! ```
//!
//! The same value drives both executions: the in-memory pipeline in
//! [`crate::table`] and the SQL compiler in [`crate::sql`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineResult;
use crate::table::RowView;
use crate::types::ColumnType;
use crate::value::Value;

/// Everything a query can ask of a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Operations {
    pub select: Select,
    pub from: FromTable,
    pub filter: Vec<FilterEntry>,
    pub sort: Vec<SortCriterion>,
    pub slice: Slice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<NameOverride>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<TypeOverride>>,
    /// Derived columns carry closures, so they exist only in-process and are
    /// skipped on the wire.
    #[serde(skip)]
    pub derive: Option<Vec<DerivedColumn>>,
}

/// Column projection. `None` keeps every column; an explicit empty list
/// projects everything away (rows survive as empty tuples).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Select {
    pub columns: Option<Vec<String>>,
}

impl Select {
    pub fn columns(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Select {
            columns: Some(columns.into_iter().map(Into::into).collect()),
        }
    }
}

/// The source table reference. Only the SQL compiler reads it; the in-memory
/// pipeline already has its rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FromTable {
    pub table: Option<TableRef>,
}

impl FromTable {
    pub fn named(table: impl Into<String>) -> Self {
        FromTable {
            table: Some(TableRef::Name(table.into())),
        }
    }
}

/// A plain or database/schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableRef {
    Name(String),
    Qualified {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        database: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        table: String,
    },
}

/// One filter entry: an operation applied to a column operand and zero or
/// more value operands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterEntry {
    #[serde(rename = "type")]
    pub op: FilterOp,
    pub operands: Vec<Operand>,
}

impl FilterEntry {
    pub fn new(op: FilterOp, operands: Vec<Operand>) -> Self {
        FilterEntry { op, operands }
    }
}

/// The filter operations. Wire names are the short codes table editors emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "ne")]
    Ne,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lte")]
    Lte,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gte")]
    Gte,
    /// Substring match.
    #[serde(rename = "c")]
    Contains,
    #[serde(rename = "nc")]
    NotContains,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "nin")]
    NotIn,
    /// Null-likeness test; takes no value operand.
    #[serde(rename = "n")]
    IsNull,
    #[serde(rename = "nn")]
    IsNotNull,
    /// Type-validity test; the single value operand names the type.
    #[serde(rename = "v")]
    IsValid,
    #[serde(rename = "nv")]
    IsNotValid,
}

/// A filter operand: either a column reference or a literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Value),
}

impl Operand {
    pub fn column(name: impl Into<String>) -> Self {
        Operand::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }
}

#[derive(Serialize, Deserialize)]
struct OperandRepr {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            Operand::Column(name) => OperandRepr {
                kind: "column".to_owned(),
                value: serde_json::Value::String(name.clone()),
            },
            Operand::Literal(value) => OperandRepr {
                kind: "primitive".to_owned(),
                value: value.to_json(),
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Operand, D::Error> {
        let repr = OperandRepr::deserialize(deserializer)?;
        if repr.kind == "column" {
            let name = match repr.value {
                serde_json::Value::String(s) => s,
                other => Value::from_json(&other).to_js_string(),
            };
            Ok(Operand::Column(name))
        } else {
            Ok(Operand::Literal(Value::from_json(&repr.value)))
        }
    }
}

/// One sort criterion. Criteria are applied in declaration order, with later
/// criteria breaking ties of earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub column: String,
    pub direction: SortDirection,
}

impl SortCriterion {
    pub fn asc(column: impl Into<String>) -> Self {
        SortCriterion {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        SortCriterion {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// The uppercase SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A half-open row window. `None` bounds are unbounded; negative bounds clamp
/// to zero in the in-memory pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Renames `column` to `name` in the output. Applied last, after projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameOverride {
    pub column: String,
    pub name: String,
}

impl NameOverride {
    pub fn new(column: impl Into<String>, name: impl Into<String>) -> Self {
        NameOverride {
            column: column.into(),
            name: name.into(),
        }
    }
}

/// Asserts a column's type, overriding inference. Assertions for columns the
/// row set does not have are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOverride {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl TypeOverride {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        TypeOverride {
            name: name.into(),
            column_type,
        }
    }
}

type DeriveFn = Arc<dyn Fn(&RowView<'_>) -> EngineResult<Value> + Send + Sync>;

/// A derived column: a name plus a formula evaluated per row.
///
/// The formula sees the row through a [`RowView`], which resolves columns by
/// their *renamed* names. A failing formula records a per-row error instead of
/// aborting the query.
#[derive(Clone)]
pub struct DerivedColumn {
    pub name: String,
    func: DeriveFn,
}

impl DerivedColumn {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&RowView<'_>) -> EngineResult<Value> + Send + Sync + 'static,
    ) -> Self {
        DerivedColumn {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub(crate) fn evaluate(&self, row: &RowView<'_>) -> EngineResult<Value> {
        (self.func)(row)
    }
}

impl fmt::Debug for DerivedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedColumn")
            .field("name", &self.name)
            .field("func", &"<fn>")
            .finish()
    }
}
