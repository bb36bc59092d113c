//! Database client traits and the capability model.
//!
//! A [`DatabaseClient`] is the engine's view of an external database. The
//! base trait covers what every client can do cheaply: name its dialect,
//! escape identifiers, and render a [`QueryTemplate`] into a request. The
//! execution surfaces are separate traits ([`Queryable`] for one-shot
//! results, [`Streamable`] for incremental batches, [`Describable`] for
//! catalog introspection) reached through capability accessors, so callers
//! probe with `client.as_streamable()` instead of duck-typing.
//!
//! The provided [`DatabaseClient::sql`] drains whichever execution surface
//! the client has, preferring streams, and fails with a descriptive error
//! when there is none.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::invalidation::Invalidation;
use crate::sql::{Dialect, QueryTemplate};
use crate::types::{ColumnType, Row, Schema, Table};
use crate::value::Value;

/// A rendered query: SQL text with the client's placeholder syntax plus the
/// bound parameters in order.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub source: String,
    pub params: Vec<Value>,
}

/// Per-query options handed to a client.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Cancellation token; a client should stop work once it fires.
    pub invalidation: Option<Invalidation>,
}

/// Row batches as a stream; each item is one batch.
pub type RowBatchStream = Pin<Box<dyn Stream<Item = EngineResult<Vec<Row>>> + Send>>;

/// An incremental result: the schema up front, rows in batches behind it.
pub struct StreamedQuery {
    pub schema: Schema,
    pub batches: RowBatchStream,
}

impl fmt::Debug for StreamedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedQuery")
            .field("schema", &self.schema)
            .field("batches", &"<stream>")
            .finish()
    }
}

/// One-shot query execution.
#[async_trait]
pub trait Queryable: Send + Sync {
    async fn query(&self, request: QueryRequest, options: QueryOptions) -> EngineResult<Table>;
}

/// Incremental query execution.
#[async_trait]
pub trait Streamable: Send + Sync {
    async fn query_stream(
        &self,
        request: QueryRequest,
        options: QueryOptions,
    ) -> EngineResult<StreamedQuery>;
}

/// A table in a client's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
}

/// A column in a client's catalog, with both the engine's semantic type and
/// the database's own type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(
        rename = "databaseType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub database_type: Option<String>,
}

/// Catalog introspection.
#[async_trait]
pub trait Describable: Send + Sync {
    async fn describe_tables(&self) -> EngineResult<Vec<TableDescription>>;
    async fn describe_columns(&self, table: &str) -> EngineResult<Vec<ColumnDescription>>;
}

/// The engine's view of an external database.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// The dialect queries should be compiled for.
    fn dialect(&self) -> Dialect {
        Dialect::Generic
    }

    /// Escapes one identifier. The default is pass-through; real clients
    /// quote.
    fn escape(&self, identifier: &str) -> String {
        identifier.to_owned()
    }

    /// Renders a template into a request. The default joins fragments with
    /// `?` placeholders.
    fn query_tag(&self, template: &QueryTemplate) -> QueryRequest {
        QueryRequest {
            source: template.join("?"),
            params: template.params().to_vec(),
        }
    }

    /// Executes a template by draining whichever execution surface this
    /// client has, preferring streams.
    async fn sql(&self, template: &QueryTemplate) -> EngineResult<Table> {
        let request = self.query_tag(template);
        if let Some(streamable) = self.as_streamable() {
            let streamed = streamable
                .query_stream(request, QueryOptions::default())
                .await?;
            return collect_streamed(streamed).await;
        }
        if let Some(queryable) = self.as_queryable() {
            return queryable.query(request, QueryOptions::default()).await;
        }
        Err(EngineError::UnsupportedClient)
    }

    fn as_queryable(&self) -> Option<&dyn Queryable> {
        None
    }

    fn as_streamable(&self) -> Option<&dyn Streamable> {
        None
    }

    fn as_describable(&self) -> Option<&dyn Describable> {
        None
    }
}

/// A client with every default: generic dialect, pass-through escaping, no
/// execution capability. Handy for compiling templates without a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericClient;

#[async_trait]
impl DatabaseClient for GenericClient {}

/// Drains a streamed result into a table.
pub async fn collect_streamed(streamed: StreamedQuery) -> EngineResult<Table> {
    let StreamedQuery { schema, mut batches } = streamed;
    let mut rows: Vec<Row> = Vec::new();
    while let Some(batch) = batches.next().await {
        rows.extend(batch?);
    }
    Ok(Table::with_schema(schema, rows))
}

/// Executes a template and returns only the first row, if any.
pub async fn query_row(
    client: &dyn DatabaseClient,
    template: &QueryTemplate,
) -> EngineResult<Option<Row>> {
    let table = client.sql(template).await?;
    Ok(table.into_rows().into_iter().next())
}

/// Maps a database's column type name to the engine's semantic type, the way
/// embedded analytics databases report them.
pub fn column_type_for_database_type(database_type: &str) -> ColumnType {
    match database_type {
        "BIGINT" | "HUGEINT" | "UBIGINT" => ColumnType::BigInt,
        "DOUBLE" | "REAL" | "FLOAT" => ColumnType::Number,
        "INTEGER" | "SMALLINT" | "TINYINT" | "USMALLINT" | "UINTEGER" | "UTINYINT" => {
            ColumnType::Integer
        }
        "BOOLEAN" => ColumnType::Boolean,
        "DATE" | "TIMESTAMP" | "TIMESTAMP WITH TIME ZONE" => ColumnType::Date,
        "VARCHAR" | "UUID" => ColumnType::String,
        other => {
            if other.starts_with("DECIMAL(") {
                ColumnType::Integer
            } else {
                ColumnType::Other
            }
        }
    }
}
