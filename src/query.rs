//! Query evaluation and incremental result accumulation.
//!
//! Compiled templates execute through whichever surface a client offers,
//! preferring streams. Streamed results accumulate into a [`QueryStream`]:
//! each call to [`QueryStream::next`] advances the underlying batches and
//! yields a snapshot, rate-limited so front-ends repaint at most every
//! 150ms instead of once per batch. The final snapshot has `done` set, or
//! `error` when a batch failed mid-stream.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;

use crate::client::{DatabaseClient, QueryOptions, StreamedQuery};
use crate::error::{EngineError, EngineResult};
use crate::invalidation::Invalidation;
use crate::observability::EngineObserver;
use crate::operations::Operations;
use crate::source::{LoadMode, ResolvedSource, SourceId, SourceLoader};
use crate::sql::{make_query_template, QueryTemplate};
use crate::table::{transform, TransformedTable};
use crate::types::{Row, Schema, Table};

/// How often an accumulating stream is willing to yield a snapshot.
const YIELD_INTERVAL: Duration = Duration::from_millis(150);

/// An accumulated snapshot of a streaming query.
#[derive(Debug, Default)]
pub struct QueryResults {
    /// Every row received so far.
    pub rows: Vec<Row>,
    /// Schema reported by the client, available from the first snapshot.
    pub schema: Option<Schema>,
    /// Set on the final snapshot of a stream that ran to completion.
    pub done: bool,
    /// Set on the final snapshot when a batch failed mid-stream.
    pub error: Option<EngineError>,
}

enum StreamState {
    Pending(BoxFuture<'static, EngineResult<StreamedQuery>>),
    Streaming(crate::client::RowBatchStream),
    Finished,
}

/// A streaming query result that accumulates rows across snapshots.
pub struct QueryStream {
    results: QueryResults,
    state: StreamState,
    pending: Option<Vec<Row>>,
    last_yield: Instant,
    throttle: Duration,
    observer: Option<Arc<dyn EngineObserver>>,
    label: String,
}

impl fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            StreamState::Pending(_) => "pending",
            StreamState::Streaming(_) => "streaming",
            StreamState::Finished => "finished",
        };
        f.debug_struct("QueryStream")
            .field("state", &state)
            .field("rows", &self.results.rows.len())
            .field("done", &self.results.done)
            .finish()
    }
}

impl QueryStream {
    pub(crate) fn new(
        label: String,
        request: BoxFuture<'static, EngineResult<StreamedQuery>>,
    ) -> Self {
        Self {
            results: QueryResults::default(),
            state: StreamState::Pending(request),
            pending: None,
            last_yield: Instant::now(),
            throttle: YIELD_INTERVAL,
            observer: None,
            label,
        }
    }

    /// Attaches an observer for query lifecycle events.
    pub fn set_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observer = Some(observer);
    }

    /// The most recent accumulated snapshot.
    pub fn results(&self) -> &QueryResults {
        &self.results
    }

    /// Advances to the next snapshot, or `None` once the final snapshot has
    /// been yielded. An error here means the request itself failed; batch
    /// failures surface through [`QueryResults::error`] instead.
    pub async fn next(&mut self) -> EngineResult<Option<&QueryResults>> {
        loop {
            match &mut self.state {
                StreamState::Pending(request) => match request.await {
                    Ok(streamed) => {
                        if let Some(observer) = &self.observer {
                            observer.on_query_started(&self.label);
                        }
                        self.results.schema = Some(streamed.schema);
                        self.state = StreamState::Streaming(streamed.batches);
                    }
                    Err(err) => {
                        self.state = StreamState::Finished;
                        return Err(err);
                    }
                },
                StreamState::Streaming(batches) => {
                    if let Some(rows) = self.pending.take() {
                        self.results.rows.extend(rows);
                    }
                    match batches.next().await {
                        Some(Ok(rows)) => {
                            if let Some(observer) = &self.observer {
                                observer.on_query_row_batch(&self.label, rows.len());
                            }
                            // Yield what has accumulated before taking the
                            // new batch, so a snapshot is never mid-batch.
                            if self.last_yield.elapsed() > self.throttle
                                && !self.results.rows.is_empty()
                            {
                                self.pending = Some(rows);
                                self.last_yield = Instant::now();
                                return Ok(Some(&self.results));
                            }
                            self.results.rows.extend(rows);
                        }
                        Some(Err(err)) => {
                            self.results.error = Some(err);
                            self.state = StreamState::Finished;
                            return Ok(Some(&self.results));
                        }
                        None => {
                            self.results.done = true;
                            self.state = StreamState::Finished;
                            if let Some(observer) = &self.observer {
                                observer.on_query_finished(&self.label, self.results.rows.len());
                            }
                            return Ok(Some(&self.results));
                        }
                    }
                }
                StreamState::Finished => return Ok(None),
            }
        }
    }

    /// Drains the stream to completion and returns the final results.
    pub async fn collect(mut self) -> EngineResult<QueryResults> {
        while self.next().await?.is_some() {}
        Ok(self.results)
    }
}

/// The two shapes a query can come back in.
#[derive(Debug)]
pub enum QueryOutput {
    /// The complete result.
    Rows(Table),
    /// An incrementally accumulated result.
    Stream(QueryStream),
}

/// Executes a compiled template against a client, preferring the streaming
/// surface, then one-shot queries, then the client's own `sql`.
pub async fn evaluate_query(
    client: Arc<dyn DatabaseClient>,
    template: &QueryTemplate,
    invalidation: Option<Invalidation>,
) -> EngineResult<QueryOutput> {
    let request = client.query_tag(template);
    let options = QueryOptions { invalidation };

    if client.as_streamable().is_some() {
        let label = request.source.clone();
        let client = client.clone();
        let pending = async move {
            match client.as_streamable() {
                Some(streamable) => streamable.query_stream(request, options).await,
                None => Err(EngineError::UnsupportedClient),
            }
        }
        .boxed();
        return Ok(QueryOutput::Stream(QueryStream::new(label, pending)));
    }

    if let Some(queryable) = client.as_queryable() {
        return Ok(QueryOutput::Rows(queryable.query(request, options).await?));
    }

    Ok(QueryOutput::Rows(client.sql(template).await?))
}

/// The outcome of a table-mode query.
#[derive(Debug)]
pub enum QueryOutcome {
    /// The source resolved to rows and the operations ran in memory.
    Transformed(TransformedTable),
    /// The source resolved to a client and the compiled query returned a
    /// complete table.
    Rows(Table),
    /// The source resolved to a client that streams.
    Stream(QueryStream),
}

/// Loads a source in table mode and applies `operations`: in memory when it
/// resolves to rows, compiled to SQL when it resolves to a client.
pub async fn query_table(
    loader: &SourceLoader,
    id: SourceId,
    operations: &Operations,
    invalidation: Option<Invalidation>,
) -> EngineResult<QueryOutcome> {
    match loader.load(id, LoadMode::Table).await? {
        ResolvedSource::Rows(table) => {
            Ok(QueryOutcome::Transformed(transform(&table, operations)?))
        }
        ResolvedSource::Client(client) => {
            let template = make_query_template(operations, client.as_ref())?;
            match evaluate_query(client, &template, invalidation).await? {
                QueryOutput::Rows(table) => Ok(QueryOutcome::Rows(table)),
                QueryOutput::Stream(stream) => Ok(QueryOutcome::Stream(stream)),
            }
        }
    }
}

/// Loads a source in SQL mode and runs a prepared template against it.
pub async fn query_template(
    loader: &SourceLoader,
    id: SourceId,
    template: &QueryTemplate,
    invalidation: Option<Invalidation>,
) -> EngineResult<QueryOutput> {
    match loader.load(id, LoadMode::Sql).await? {
        ResolvedSource::Client(client) => evaluate_query(client, template, invalidation).await,
        ResolvedSource::Rows(_) => Err(EngineError::InvalidDataSource),
    }
}
