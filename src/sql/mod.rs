//! Compiling an operation set into a parameterized SQL query.
//!
//! The output is a [`QueryTemplate`]: SQL text fragments interleaved with
//! bound parameter values, the shape tagged-template database clients consume.
//! With `n` parameters there are always `n + 1` fragments, so a client can
//! join the fragments with its placeholder syntax:
//!
//! ```
//! use table_query_engine::operations::{FilterEntry, FilterOp, FromTable, Operand, Operations};
//! use table_query_engine::sql::make_query_template;
//! use table_query_engine::client::GenericClient;
//!
//! let operations = Operations {
//!     from: FromTable::named("data"),
//!     filter: vec![FilterEntry::new(
//!         FilterOp::Eq,
//!         vec![Operand::column("id"), Operand::literal(42.0)],
//!     )],
//!     ..Operations::default()
//! };
//! let template = make_query_template(&operations, &GenericClient)?;
//! assert_eq!(template.join("?"), "SELECT * FROM data\nWHERE id = ?");
//! assert_eq!(template.params().len(), 1);
//! # Ok::<(), table_query_engine::EngineError>(())
//! ```
//!
//! Pagination is dialect-aware: most dialects take `LIMIT`/`OFFSET`, while
//! MSSQL and Oracle take `OFFSET … ROWS FETCH NEXT … ROWS ONLY` and require
//! an `ORDER BY`, which is synthesized from the first selected column when
//! the operation set has no sort.

use crate::client::DatabaseClient;
use crate::error::{EngineError, EngineResult};
use crate::operations::{FilterEntry, FilterOp, Operand, Operations, SortCriterion, TableRef};
use crate::value::Value;

/// Row-count sentinel for an unbounded fetch.
const UNBOUNDED_ROWS: i64 = 1_000_000_000;

/// The SQL dialect a client speaks, as far as compilation cares: only the
/// pagination clause differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Generic,
    MsSql,
    Oracle,
}

impl Dialect {
    /// Maps a dialect tag to a dialect; unrecognized tags (postgres, mysql,
    /// duckdb, …) all paginate generically.
    pub fn from_name(name: &str) -> Dialect {
        match name {
            "mssql" => Dialect::MsSql,
            "oracle" => Dialect::Oracle,
            _ => Dialect::Generic,
        }
    }
}

/// A parameterized SQL query: text fragments interleaved with parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    strings: Vec<String>,
    params: Vec<Value>,
}

impl QueryTemplate {
    pub fn new() -> Self {
        QueryTemplate {
            strings: vec![String::new()],
            params: Vec::new(),
        }
    }

    /// Rebuilds a template from its parts.
    ///
    /// # Panics
    ///
    /// Panics unless `strings.len() == params.len() + 1`.
    pub fn from_parts(strings: Vec<String>, params: Vec<Value>) -> Self {
        assert_eq!(
            strings.len(),
            params.len() + 1,
            "a template needs one more fragment than it has parameters"
        );
        QueryTemplate { strings, params }
    }

    /// Appends SQL text to the current fragment.
    pub fn push_sql(&mut self, sql: &str) {
        if let Some(last) = self.strings.last_mut() {
            last.push_str(sql);
        }
    }

    /// Binds a parameter and opens the next fragment.
    pub fn push_param(&mut self, value: Value) {
        self.params.push(value);
        self.strings.push(String::new());
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The SQL text with `placeholder` in each parameter position.
    pub fn join(&self, placeholder: &str) -> String {
        self.strings.join(placeholder)
    }
}

impl Default for QueryTemplate {
    fn default() -> Self {
        QueryTemplate::new()
    }
}

/// Compiles `operations` into a SQL template for `client`.
///
/// Derived columns cannot be pushed into SQL and are ignored here; the
/// in-memory pipeline is the only executor for them.
pub fn make_query_template(
    operations: &Operations,
    client: &dyn DatabaseClient,
) -> EngineResult<QueryTemplate> {
    let escape = |name: &str| client.escape(name);
    if !has_table(&operations.from.table) {
        return Err(EngineError::MissingFromTable);
    }
    let table = match &operations.from.table {
        Some(table) => table,
        None => return Err(EngineError::MissingFromTable),
    };

    let column_text = match &operations.select.columns {
        None => "*".to_owned(),
        Some(columns) if columns.is_empty() => return Err(EngineError::EmptySelection),
        Some(columns) => columns
            .iter()
            .map(|column| match alias_for(operations, column) {
                Some(alias) => format!("{} AS {}", escape(column), escape(&alias)),
                None => escape(column),
            })
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut template = QueryTemplate::new();
    template.push_sql(&format!(
        "SELECT {column_text} FROM {}",
        format_table(table, &escape)
    ));

    for (i, entry) in operations.filter.iter().enumerate() {
        template.push_sql(if i == 0 { "\nWHERE " } else { "\nAND " });
        append_where_entry(&mut template, entry, &escape)?;
    }

    for (i, criterion) in operations.sort.iter().enumerate() {
        template.push_sql(if i == 0 { "\nORDER BY " } else { ", " });
        append_order_by(&mut template, criterion, &escape);
    }

    let slice = &operations.slice;
    match client.dialect() {
        Dialect::MsSql | Dialect::Oracle => {
            if slice.to.is_some() || slice.from.is_some() {
                if operations.sort.is_empty() {
                    // These dialects only paginate ordered results, so order
                    // by the first selected column.
                    let column = operations
                        .select
                        .columns
                        .as_ref()
                        .and_then(|columns| columns.first())
                        .ok_or(EngineError::ExplicitColumnsRequired)?;
                    template.push_sql("\nORDER BY ");
                    append_order_by(&mut template, &SortCriterion::asc(column), &escape);
                }
                template.push_sql(&format!("\nOFFSET {} ROWS", slice.from.unwrap_or(0)));
                let rows = slice
                    .to
                    .map(|to| to - slice.from.unwrap_or(0))
                    .unwrap_or(UNBOUNDED_ROWS);
                template.push_sql(&format!("\nFETCH NEXT {rows} ROWS ONLY"));
            }
        }
        Dialect::Generic => {
            if slice.to.is_some() || slice.from.is_some() {
                let limit = slice
                    .to
                    .map(|to| to - slice.from.unwrap_or(0))
                    .unwrap_or(UNBOUNDED_ROWS);
                template.push_sql(&format!("\nLIMIT {limit}"));
                if let Some(from) = slice.from {
                    template.push_sql(&format!(" OFFSET {from}"));
                }
            }
        }
    }

    Ok(template)
}

fn has_table(table: &Option<TableRef>) -> bool {
    match table {
        None => false,
        Some(TableRef::Name(name)) => !name.is_empty(),
        Some(TableRef::Qualified { .. }) => true,
    }
}

fn alias_for(operations: &Operations, column: &str) -> Option<String> {
    operations.names.as_ref().and_then(|overrides| {
        overrides
            .iter()
            .rev()
            .find(|o| o.column == column)
            .map(|o| o.name.clone())
    })
}

fn format_table(table: &TableRef, escape: &dyn Fn(&str) -> String) -> String {
    match table {
        TableRef::Name(name) => escape(name),
        TableRef::Qualified {
            database,
            schema,
            table,
        } => {
            let mut parts = Vec::new();
            if let Some(database) = database {
                parts.push(escape(database));
            }
            if let Some(schema) = schema {
                parts.push(escape(schema));
            }
            parts.push(escape(table));
            parts.join(".")
        }
    }
}

fn append_order_by(
    template: &mut QueryTemplate,
    criterion: &SortCriterion,
    escape: &dyn Fn(&str) -> String,
) {
    template.push_sql(&format!(
        "{} {}",
        escape(&criterion.column),
        criterion.direction.as_sql()
    ));
}

fn append_where_entry(
    template: &mut QueryTemplate,
    entry: &FilterEntry,
    escape: &dyn Fn(&str) -> String,
) -> EngineResult<()> {
    let operands = &entry.operands;
    if operands.is_empty() {
        return Err(EngineError::InvalidOperandLength);
    }

    // Unary tests; the validity tests also compile to null checks, whatever
    // their operand count.
    if operands.len() == 1 || matches!(entry.op, FilterOp::IsValid | FilterOp::IsNotValid) {
        append_operand(template, &operands[0], escape);
        match entry.op {
            FilterOp::IsNull | FilterOp::IsNotValid => template.push_sql(" IS NULL"),
            FilterOp::IsNotNull | FilterOp::IsValid => template.push_sql(" IS NOT NULL"),
            _ => return Err(EngineError::InvalidFilterOperation),
        }
        return Ok(());
    }

    if operands.len() == 2 {
        match entry.op {
            // Two-operand membership still takes the list form below.
            FilterOp::In | FilterOp::NotIn => {}
            FilterOp::Contains | FilterOp::NotContains => {
                append_operand(template, &operands[0], escape);
                template.push_sql(if entry.op == FilterOp::Contains {
                    " LIKE "
                } else {
                    " NOT LIKE "
                });
                append_operand(template, &like_operand(&operands[1]), escape);
                return Ok(());
            }
            FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Lt | FilterOp::Gte
            | FilterOp::Lte => {
                append_operand(template, &operands[0], escape);
                template.push_sql(match entry.op {
                    FilterOp::Eq => " = ",
                    FilterOp::Ne => " <> ",
                    FilterOp::Gt => " > ",
                    FilterOp::Lt => " < ",
                    FilterOp::Gte => " >= ",
                    _ => " <= ",
                });
                append_operand(template, &operands[1], escape);
                return Ok(());
            }
            _ => return Err(EngineError::InvalidFilterOperation),
        }
    }

    // List form: `column IN (?,?,…)`.
    append_operand(template, &operands[0], escape);
    match entry.op {
        FilterOp::In => template.push_sql(" IN ("),
        FilterOp::NotIn => template.push_sql(" NOT IN ("),
        _ => return Err(EngineError::InvalidFilterOperation),
    }
    for (i, operand) in operands[1..].iter().enumerate() {
        if i > 0 {
            template.push_sql(",");
        }
        append_operand(template, operand, escape);
    }
    template.push_sql(")");
    Ok(())
}

/// Columns compile to escaped identifiers in the SQL text; literals become
/// bound parameters.
fn append_operand(template: &mut QueryTemplate, operand: &Operand, escape: &dyn Fn(&str) -> String) {
    match operand {
        Operand::Column(name) => template.push_sql(&escape(name)),
        Operand::Literal(value) => template.push_param(value.clone()),
    }
}

/// Wraps a substring-match operand in `%` wildcards.
fn like_operand(operand: &Operand) -> Operand {
    match operand {
        Operand::Column(name) => Operand::Column(format!("%{name}%")),
        Operand::Literal(value) => Operand::Literal(Value::Str(format!("%{}%", value.to_js_string()))),
    }
}
