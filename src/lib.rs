//! `table-query-engine` evaluates notebook-style table queries against data
//! sources: in-memory rows, file attachments, and SQL databases.
//!
//! A query is a declarative [`operations::Operations`] value: select, from,
//! filter, sort, slice, plus renames, type overrides, and derived columns.
//! The engine runs it one of two ways:
//!
//! - **In memory**: [`table::transform`] applies the full pipeline to a
//!   [`types::Table`], with schema inference and JavaScript-style value
//!   coercion along the way.
//! - **Compiled to SQL**: [`sql::make_query_template`] turns the same
//!   operations into a parameterized `SELECT` for a
//!   [`client::DatabaseClient`], with dialect-specific pagination.
//!
//! ## Quick example: transform rows in memory
//!
//! Untyped cells are inferred and coerced before the operations run, so a
//! column of numeric strings filters numerically:
//!
//! ```rust
//! use table_query_engine::operations::{FilterEntry, FilterOp, Operand, Operations};
//! use table_query_engine::table::transform;
//! use table_query_engine::types::Table;
//! use table_query_engine::value::Value;
//!
//! # fn main() -> Result<(), table_query_engine::EngineError> {
//! let table = Table::new(
//!     vec!["name".into(), "size".into()],
//!     vec![
//!         vec![Value::from("a.txt"), Value::from("21")],
//!         vec![Value::from("b.txt"), Value::from("3")],
//!     ],
//! );
//! let mut operations = Operations::default();
//! operations.filter = vec![FilterEntry::new(
//!     FilterOp::Gte,
//!     vec![Operand::column("size"), Operand::literal(10.0)],
//! )];
//! let transformed = transform(&table, &operations)?;
//! assert_eq!(transformed.rows().len(), 1);
//! assert_eq!(transformed.rows()[0][0], Value::from("a.txt"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick example: compile the same operations to SQL
//!
//! ```rust
//! use table_query_engine::client::GenericClient;
//! use table_query_engine::operations::{
//!     FilterEntry, FilterOp, FromTable, Operand, Operations, Select,
//! };
//! use table_query_engine::sql::make_query_template;
//!
//! # fn main() -> Result<(), table_query_engine::EngineError> {
//! let mut operations = Operations::default();
//! operations.select = Select::columns(["name", "size"]);
//! operations.from = FromTable::named("files");
//! operations.filter = vec![FilterEntry::new(
//!     FilterOp::Gte,
//!     vec![Operand::column("size"), Operand::literal(10.0)],
//! )];
//! let template = make_query_template(&operations, &GenericClient)?;
//! assert_eq!(
//!     template.join("?"),
//!     "SELECT name, size FROM files\nWHERE size >= ?"
//! );
//! assert_eq!(template.params().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading sources
//!
//! Sources are registered with a [`source::SourceLoader`], which caches each
//! resolved form and de-duplicates concurrent loads:
//!
//! ```no_run
//! use std::sync::Arc;
//! use table_query_engine::source::{
//!     DataSource, LoadMode, LoaderOptions, LocalFileAttachment, SourceLoader,
//! };
//!
//! # async fn demo() -> Result<(), table_query_engine::EngineError> {
//! let loader = SourceLoader::new(LoaderOptions::default());
//! let id = loader.register(DataSource::File(Arc::new(
//!     LocalFileAttachment::new("people.csv"),
//! )));
//! let resolved = loader.load(id, LoadMode::Table).await?;
//! println!("{resolved:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`operations`]: the declarative query surface (wire-compatible serde)
//! - [`table`]: the in-memory pipeline
//! - [`sql`]: operations-to-SQL compilation and dialects
//! - [`types`]: tables, schemas, column types
//! - [`value`]: the dynamic cell value and its conversion rules
//! - [`coerce`] / [`infer`] / [`validate`]: the typing machinery
//! - [`source`]: source registration, file attachments, the load cache
//! - [`client`]: database client traits and capabilities
//! - [`query`]: query evaluation and streaming accumulation
//! - [`invalidation`]: cancellation tokens for long-running queries
//! - [`observability`]: observer hooks for loads, cache churn, and queries
//! - [`error`]: error types used across the engine

pub mod client;
pub mod coerce;
pub mod error;
pub mod infer;
pub mod invalidation;
pub mod observability;
pub mod operations;
pub mod query;
pub mod source;
pub mod sql;
pub mod table;
pub mod types;
pub mod validate;
pub mod value;

pub use error::{EngineError, EngineResult};
pub use types::{Row, Schema, Table};
pub use value::Value;
