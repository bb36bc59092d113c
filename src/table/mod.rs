//! The in-memory query pipeline.
//!
//! [`transform`] applies an [`Operations`] value to a [`Table`] without ever
//! mutating it, in a fixed order:
//!
//! 1. resolve the schema (use the source's, else infer one),
//! 2. apply type assertions and coerce rows,
//! 3. evaluate derived columns,
//! 4. filter,
//! 5. sort (stable, missing values last),
//! 6. slice,
//! 7. project selected columns,
//! 8. apply renames.
//!
//! The result carries the projected schema, the pre-projection `full_schema`,
//! and any per-row derive failures.
//!
//! ```
//! use table_query_engine::operations::{Operations, Select, SortCriterion};
//! use table_query_engine::table::transform;
//! use table_query_engine::{Table, Value};
//!
//! let table = Table::new(
//!     vec!["name".into(), "size".into()],
//!     vec![
//!         vec![Value::Str("a".into()), Value::Str("12".into())],
//!         vec![Value::Str("b".into()), Value::Str("4".into())],
//!     ],
//! );
//! let operations = Operations {
//!     sort: vec![SortCriterion::desc("size")],
//!     select: Select::columns(["name"]),
//!     ..Operations::default()
//! };
//! let result = transform(&table, &operations)?;
//! assert_eq!(result.table.rows()[0], vec![Value::Str("a".into())]);
//! # Ok::<(), table_query_engine::EngineError>(())
//! ```

mod filter;

use std::collections::HashMap;

use crate::coerce::coerce_row;
use crate::error::{EngineError, EngineResult};
use crate::infer::infer_schema;
use crate::operations::{DerivedColumn, NameOverride, Operations, SortDirection};
use crate::types::{Row, Schema, Table};
use crate::value::{ascending_defined, descending_defined, Value};
use filter::FilterPlan;

/// A read-only view of one row, used by derived-column formulas.
///
/// Lookups go by the column's *renamed* name when a rename override exists;
/// unknown names read as `Undefined`.
pub struct RowView<'a> {
    names: &'a [String],
    row: &'a Row,
}

impl<'a> RowView<'a> {
    pub(crate) fn new(names: &'a [String], row: &'a Row) -> Self {
        RowView { names, row }
    }

    pub fn get(&self, name: &str) -> &Value {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.row.get(i))
            .unwrap_or(&Value::Undefined)
    }

    pub fn names(&self) -> &[String] {
        self.names
    }
}

/// One derive failure: the row index plus the formula's error.
#[derive(Debug)]
pub struct DeriveFailure {
    pub index: usize,
    pub error: EngineError,
}

/// Failures keyed by derived-column name.
pub type DeriveErrors = HashMap<String, Vec<DeriveFailure>>;

/// The output of [`transform`].
#[derive(Debug)]
pub struct TransformedTable {
    /// The projected, renamed rows.
    pub table: Table,
    /// Schema of the projected columns.
    pub schema: Schema,
    /// Schema of every column as it stood before projection, so a UI can
    /// offer deselected columns for re-selection.
    pub full_schema: Schema,
    /// Derive failures, if any. A failed cell is undefined going into
    /// coercion, so it ends up as the derived column's failure marker.
    pub errors: DeriveErrors,
}

impl TransformedTable {
    pub fn rows(&self) -> &[Row] {
        self.table.rows()
    }
}

/// Applies `operations` to `source`, returning a new table. The source is
/// never mutated.
pub fn transform(source: &Table, operations: &Operations) -> EngineResult<TransformedTable> {
    let (mut rows, mut schema) = apply_types(source, operations)?;
    let mut columns: Vec<String> = source.columns().to_vec();
    let mut errors: DeriveErrors = HashMap::new();

    if let Some(derives) = &operations.derive {
        apply_derives(
            derives,
            operations,
            &mut columns,
            &mut rows,
            &mut schema,
            &mut errors,
        )?;
    }

    for entry in &operations.filter {
        let plan = FilterPlan::compile(entry, &columns);
        rows.retain(|row| plan.matches(row));
    }

    // Later criteria break ties of earlier ones: apply them in reverse with a
    // stable sort each time.
    for criterion in operations.sort.iter().rev() {
        if let Some(index) = columns.iter().position(|c| c == &criterion.column) {
            let compare = match criterion.direction {
                SortDirection::Asc => ascending_defined,
                SortDirection::Desc => descending_defined,
            };
            rows.sort_by(|a, b| {
                compare(
                    a.get(index).unwrap_or(&Value::Undefined),
                    b.get(index).unwrap_or(&Value::Undefined),
                )
            });
        }
    }

    let len = rows.len();
    let from = operations.slice.from.map(|v| v.max(0) as usize).unwrap_or(0);
    let to = operations.slice.to.map(|v| v.max(0) as usize).unwrap_or(len);
    let end = to.min(len);
    let start = from.min(end);
    if end < len {
        rows.truncate(end);
    }
    if start > 0 {
        rows.drain(..start);
    }

    // Snapshot before projection: the full schema keeps deselected columns.
    let mut full_schema = schema.clone();

    if let Some(selected) = &operations.select.columns {
        let indexes: Vec<usize> = selected
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| EngineError::UnknownColumn { name: name.clone() })
            })
            .collect::<EngineResult<_>>()?;
        rows = rows
            .into_iter()
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect();
        schema = Schema::new(
            indexes
                .iter()
                .map(|&i| schema.columns[i].clone())
                .collect(),
        );
        columns = selected.clone();
    }

    if let Some(overrides) = &operations.names {
        columns = columns
            .iter()
            .map(|c| renamed(overrides, c).unwrap_or_else(|| c.clone()))
            .collect();
        for column in &mut schema.columns {
            if let Some(name) = renamed(overrides, &column.name) {
                column.name = name;
            }
        }
        for column in &mut full_schema.columns {
            if let Some(name) = renamed(overrides, &column.name) {
                column.name = name;
            }
        }
    }

    Ok(TransformedTable {
        table: Table::new(columns, rows),
        schema,
        full_schema,
        errors,
    })
}

/// Renames apply simultaneously from the pre-rename names; with duplicate
/// overrides for one column, the last wins.
fn renamed(overrides: &[NameOverride], column: &str) -> Option<String> {
    overrides
        .iter()
        .rev()
        .find(|o| o.column == column)
        .map(|o| o.name.clone())
}

/// Resolves the working schema and coerces rows to it.
///
/// Rows are coerced whenever the schema was inferred or any type assertions
/// were given; a source with a trusted schema and no assertions passes
/// through untouched.
fn apply_types(source: &Table, operations: &Operations) -> EngineResult<(Vec<Row>, Schema)> {
    let (mut schema, inferred) = match source.schema() {
        Some(schema) => (schema.clone(), false),
        None => (infer_schema(source), true),
    };
    if let Some(overrides) = &operations.types {
        for o in overrides {
            // Assertions for columns the source does not have are ignored.
            if let Some(i) = schema.index_of(&o.name) {
                schema.columns[i].column_type = o.column_type;
            }
        }
    }
    let rows = if operations.types.is_some() || inferred {
        source
            .rows()
            .iter()
            .map(|row| coerce_row(row, &schema))
            .collect::<EngineResult<Vec<Row>>>()?
    } else {
        source.rows().to_vec()
    };
    Ok((rows, schema))
}

fn apply_derives(
    derives: &[DerivedColumn],
    operations: &Operations,
    columns: &mut Vec<String>,
    rows: &mut Vec<Row>,
    schema: &mut Schema,
    errors: &mut DeriveErrors,
) -> EngineResult<()> {
    // Formulas address columns by their output (renamed) names.
    let effective: Vec<String> = match &operations.names {
        Some(overrides) => columns
            .iter()
            .map(|c| renamed(overrides, c).unwrap_or_else(|| c.clone()))
            .collect(),
        None => columns.clone(),
    };

    let mut derived_rows: Vec<Row> = vec![Vec::with_capacity(derives.len()); rows.len()];
    for derive in derives {
        for (index, row) in rows.iter().enumerate() {
            let view = RowView::new(&effective, row);
            match derive.evaluate(&view) {
                Ok(value) => derived_rows[index].push(value),
                Err(error) => {
                    errors
                        .entry(derive.name.clone())
                        .or_default()
                        .push(DeriveFailure { index, error });
                    derived_rows[index].push(Value::Undefined);
                }
            }
        }
    }

    // The derived mini-table goes through inference and assertions like any
    // other source.
    let derived_names: Vec<String> = derives.iter().map(|d| d.name.clone()).collect();
    let derived_table = Table::new(derived_names.clone(), derived_rows);
    let (derived_rows, derived_schema) = apply_types(&derived_table, operations)?;

    for (j, name) in derived_names.iter().enumerate() {
        let entry = derived_schema.columns[j].clone();
        match columns.iter().position(|c| c == name) {
            // A derived column that shadows an existing one replaces it in
            // place, keeping the column order.
            Some(i) => {
                for (row, derived) in rows.iter_mut().zip(&derived_rows) {
                    row[i] = derived[j].clone();
                }
                schema.columns[i] = entry;
            }
            None => {
                columns.push(name.clone());
                for (row, derived) in rows.iter_mut().zip(&derived_rows) {
                    row.push(derived[j].clone());
                }
                schema.columns.push(entry);
            }
        }
    }
    Ok(())
}
