//! Source registration and the load cache.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::client::DatabaseClient;
use crate::error::{EngineError, EngineResult};
use crate::observability::{
    severity_for_error, EngineObserver, EvictionReason, LoadStats, Severity, SourceContext,
};
use crate::source::{
    file_source_name, AttachData, CsvOptions, CsvTyping, DataSource, EmbeddedDatabase,
    FileAttachment, LoadMode, SourceId, DEFAULT_TABLE_NAME,
};
use crate::types::Table;

type SharedLoad = Shared<BoxFuture<'static, Result<ResolvedSource, Arc<EngineError>>>>;

/// A source resolved for one load mode.
#[derive(Clone)]
pub enum ResolvedSource {
    /// Materialized rows.
    Rows(Arc<Table>),
    /// A client to query through.
    Client(Arc<dyn DatabaseClient>),
}

impl ResolvedSource {
    pub fn rows(&self) -> Option<&Arc<Table>> {
        match self {
            ResolvedSource::Rows(table) => Some(table),
            ResolvedSource::Client(_) => None,
        }
    }

    pub fn client(&self) -> Option<&Arc<dyn DatabaseClient>> {
        match self {
            ResolvedSource::Rows(_) => None,
            ResolvedSource::Client(client) => Some(client),
        }
    }

    fn row_count(&self) -> Option<usize> {
        self.rows().map(|table| table.row_count())
    }
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedSource::Rows(table) => write!(f, "Rows({} rows)", table.row_count()),
            ResolvedSource::Client(_) => write!(f, "Client"),
        }
    }
}

/// Options controlling load caching and observability.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct LoaderOptions {
    /// How long a cached load stays usable.
    pub ttl: Duration,
    /// Cached loads kept before the least recently used one is dropped.
    pub max_entries: usize,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn EngineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 64,
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

struct Registered {
    source: DataSource,
    name: String,
}

struct CacheEntry {
    load: SharedLoad,
    rows_at_insert: Option<usize>,
    inserted_at: Instant,
    last_used: Instant,
}

#[derive(Default)]
struct LoaderState {
    next_id: u64,
    sources: HashMap<SourceId, Registered>,
    cache: HashMap<(SourceId, LoadMode), CacheEntry>,
}

/// Counts reported by [`SourceLoader::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderStats {
    pub sources: usize,
    pub cached: usize,
}

/// Registers data sources and caches their resolved forms per load mode.
///
/// Concurrent loads de-duplicate: the cache holds the shared in-flight
/// future, inserted before the first await, so two racing loads of the same
/// source resolve it once. A rows-backed source is re-resolved when its row
/// count differs from the cached load's.
pub struct SourceLoader {
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
    options: LoaderOptions,
    state: Mutex<LoaderState>,
}

impl fmt::Debug for SourceLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLoader")
            .field("options", &self.options)
            .field("embedded_set", &self.embedded.is_some())
            .finish()
    }
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new(LoaderOptions::default())
    }
}

impl SourceLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            embedded: None,
            options,
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// Sets the embedded database used to bridge rows and files into SQL.
    pub fn with_embedded(mut self, embedded: Arc<dyn EmbeddedDatabase>) -> Self {
        self.embedded = Some(embedded);
        self
    }

    /// Registers a source under a name derived from what it is: files get
    /// their stripped file name, everything else the default table name.
    pub fn register(&self, source: impl Into<DataSource>) -> SourceId {
        let source = source.into();
        let name = match &source {
            DataSource::File(file) => file_source_name(file.name()),
            _ => DEFAULT_TABLE_NAME.to_owned(),
        };
        self.register_as(source, name)
    }

    /// Registers a source under an explicit table name.
    pub fn register_named(
        &self,
        source: impl Into<DataSource>,
        name: impl Into<String>,
    ) -> SourceId {
        self.register_as(source.into(), name.into())
    }

    fn register_as(&self, source: DataSource, name: String) -> SourceId {
        let mut state = self.lock_state();
        let id = SourceId::from_raw(state.next_id);
        state.next_id += 1;
        state.sources.insert(id, Registered { source, name });
        id
    }

    /// The table name a source was registered under.
    pub fn source_name(&self, id: SourceId) -> Option<String> {
        self.lock_state().sources.get(&id).map(|r| r.name.clone())
    }

    /// Replaces the rows behind a rows-backed source. A cached load is
    /// re-resolved on its next use when the row count differs.
    pub fn update_rows(&self, id: SourceId, table: impl Into<Arc<Table>>) -> EngineResult<()> {
        let mut state = self.lock_state();
        let registered = state
            .sources
            .get_mut(&id)
            .ok_or(EngineError::UnknownSource { id: id.as_u64() })?;
        match &mut registered.source {
            DataSource::Rows(rows) => {
                *rows = table.into();
                Ok(())
            }
            _ => Err(EngineError::InvalidDataSource),
        }
    }

    /// Resolves a source for a mode, serving from cache when possible.
    pub async fn load(&self, id: SourceId, mode: LoadMode) -> EngineResult<ResolvedSource> {
        let ctx = SourceContext { id, mode };
        let mut evicted = Vec::new();
        let looked_up = self.lookup(id, mode, &mut evicted);
        self.report_evictions(&evicted);
        let (load, fresh) = match looked_up {
            Ok(hit) => hit,
            Err(err) => {
                self.report_failure(&ctx, &err);
                return Err(err);
            }
        };

        if let Some(observer) = &self.options.observer {
            if fresh {
                observer.on_load_started(&ctx);
            } else {
                observer.on_cache_hit(&ctx);
            }
        }

        match load.await {
            Ok(resolved) => {
                if fresh {
                    if let Some(observer) = &self.options.observer {
                        observer.on_load_completed(
                            &ctx,
                            LoadStats {
                                rows: resolved.row_count(),
                            },
                        );
                    }
                }
                Ok(resolved)
            }
            Err(shared) => {
                let err = EngineError::Shared(shared);
                if fresh {
                    self.report_failure(&ctx, &err);
                }
                Err(err)
            }
        }
    }

    /// Drops cached loads for a source, all modes.
    pub fn invalidate(&self, id: SourceId) {
        let mut evicted = Vec::new();
        {
            let mut state = self.lock_state();
            state.cache.retain(|&(entry_id, mode), _| {
                if entry_id != id {
                    return true;
                }
                evicted.push((SourceContext { id, mode }, EvictionReason::Explicit));
                false
            });
        }
        self.report_evictions(&evicted);
    }

    /// Unregisters a source and drops its cached loads.
    pub fn remove(&self, id: SourceId) {
        self.lock_state().sources.remove(&id);
        self.invalidate(id);
    }

    /// Drops every cached load.
    pub fn clear(&self) {
        let mut evicted = Vec::new();
        {
            let mut state = self.lock_state();
            for ((id, mode), _) in state.cache.drain() {
                evicted.push((SourceContext { id, mode }, EvictionReason::Explicit));
            }
        }
        self.report_evictions(&evicted);
    }

    /// Counts of registered sources and cached loads.
    pub fn stats(&self) -> LoaderStats {
        let state = self.lock_state();
        LoaderStats {
            sources: state.sources.len(),
            cached: state.cache.len(),
        }
    }

    /// Returns the cached-or-new load for `(id, mode)` and whether it is
    /// fresh. Inserts before returning so racing callers share one future.
    fn lookup(
        &self,
        id: SourceId,
        mode: LoadMode,
        evicted: &mut Vec<(SourceContext, EvictionReason)>,
    ) -> EngineResult<(SharedLoad, bool)> {
        let mut state = self.lock_state();
        let now = Instant::now();
        sweep_expired(&mut state, now, self.options.ttl, evicted);

        let registered = state
            .sources
            .get(&id)
            .ok_or(EngineError::UnknownSource { id: id.as_u64() })?;
        let source = registered.source.clone();
        let name = registered.name.clone();
        let rows_now = match &source {
            DataSource::Rows(table) => Some(table.row_count()),
            _ => None,
        };

        let key = (id, mode);
        let stale_hit = match state.cache.get_mut(&key) {
            Some(entry) if entry.rows_at_insert == rows_now => {
                entry.last_used = now;
                return Ok((entry.load.clone(), false));
            }
            Some(_) => true,
            None => false,
        };
        if stale_hit {
            state.cache.remove(&key);
            evicted.push((SourceContext { id, mode }, EvictionReason::Stale));
        }

        let load = resolve_future(source, name, mode, self.embedded.clone());
        state.cache.insert(
            key,
            CacheEntry {
                load: load.clone(),
                rows_at_insert: rows_now,
                inserted_at: now,
                last_used: now,
            },
        );
        sweep_capacity(&mut state, self.options.max_entries, evicted);
        Ok((load, true))
    }

    fn report_failure(&self, ctx: &SourceContext, error: &EngineError) {
        if let Some(observer) = &self.options.observer {
            let severity = severity_for_error(error);
            observer.on_failure(ctx, severity, error);
            if severity >= self.options.alert_at_or_above {
                observer.on_alert(ctx, severity, error);
            }
        }
    }

    fn report_evictions(&self, evicted: &[(SourceContext, EvictionReason)]) {
        if let Some(observer) = &self.options.observer {
            for (ctx, reason) in evicted {
                observer.on_cache_evicted(ctx, *reason);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sweep_expired(
    state: &mut LoaderState,
    now: Instant,
    ttl: Duration,
    evicted: &mut Vec<(SourceContext, EvictionReason)>,
) {
    state.cache.retain(|&(id, mode), entry| {
        if now.duration_since(entry.inserted_at) < ttl {
            return true;
        }
        evicted.push((SourceContext { id, mode }, EvictionReason::Expired));
        false
    });
}

fn sweep_capacity(
    state: &mut LoaderState,
    max_entries: usize,
    evicted: &mut Vec<(SourceContext, EvictionReason)>,
) {
    while state.cache.len() > max_entries {
        let oldest = state
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        let Some((id, mode)) = oldest else { break };
        state.cache.remove(&(id, mode));
        evicted.push((SourceContext { id, mode }, EvictionReason::Capacity));
    }
}

fn resolve_future(
    source: DataSource,
    name: String,
    mode: LoadMode,
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
) -> SharedLoad {
    async move {
        resolve(source, name, mode, embedded)
            .await
            .map_err(Arc::new)
    }
    .boxed()
    .shared()
}

async fn resolve(
    source: DataSource,
    name: String,
    mode: LoadMode,
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
) -> EngineResult<ResolvedSource> {
    match mode {
        LoadMode::Chart => resolve_chart(source),
        LoadMode::Table => resolve_table(source, &name, embedded).await,
        LoadMode::Sql => resolve_sql(source, &name, embedded).await,
    }
}

fn resolve_chart(source: DataSource) -> EngineResult<ResolvedSource> {
    match source {
        DataSource::File(file) => match file.mime_type() {
            "text/csv" => materialized(file.csv(CsvOptions {
                typed: CsvTyping::Auto,
            })?),
            "text/tab-separated-values" => materialized(file.tsv(CsvOptions {
                typed: CsvTyping::Auto,
            })?),
            "application/json" => materialized(file.json()?),
            other => Err(unsupported(other)),
        },
        DataSource::Rows(table) => Ok(ResolvedSource::Rows(table)),
        DataSource::Client(client) => Ok(ResolvedSource::Client(client)),
    }
}

async fn resolve_table(
    source: DataSource,
    name: &str,
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
) -> EngineResult<ResolvedSource> {
    match source {
        DataSource::File(file) => match file.mime_type() {
            "text/csv" => materialized(file.csv(CsvOptions::default())?),
            "text/tab-separated-values" => materialized(file.tsv(CsvOptions::default())?),
            "application/json" => materialized(file.json()?),
            "application/x-sqlite3" => Ok(ResolvedSource::Client(file.sqlite()?)),
            other => {
                #[cfg(feature = "parquet")]
                if has_extension(file.name(), "parquet") {
                    if let Some(path) = file.local_path() {
                        return materialized(super::parquet::read_parquet(path)?);
                    }
                }
                if has_extension(file.name(), "parquet") || has_extension(file.name(), "arrow") {
                    return attach_file(embedded, name, &file).await;
                }
                Err(unsupported(other))
            }
        },
        DataSource::Rows(table) => Ok(ResolvedSource::Rows(table)),
        DataSource::Client(client) => Ok(ResolvedSource::Client(client)),
    }
}

async fn resolve_sql(
    source: DataSource,
    name: &str,
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
) -> EngineResult<ResolvedSource> {
    match source {
        DataSource::File(file) => match file.mime_type() {
            "text/csv" | "text/tab-separated-values" | "application/json" => {
                attach_file(embedded, name, &file).await
            }
            "application/x-sqlite3" => Ok(ResolvedSource::Client(file.sqlite()?)),
            other => {
                if has_extension(file.name(), "parquet") || has_extension(file.name(), "arrow") {
                    return attach_file(embedded, name, &file).await;
                }
                Err(unsupported(other))
            }
        },
        DataSource::Rows(table) => attach_rows(embedded, name, &table).await,
        DataSource::Client(client) => Ok(ResolvedSource::Client(client)),
    }
}

fn materialized(table: Table) -> EngineResult<ResolvedSource> {
    Ok(ResolvedSource::Rows(Arc::new(table)))
}

async fn attach_file(
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
    name: &str,
    file: &Arc<dyn FileAttachment>,
) -> EngineResult<ResolvedSource> {
    let db = embedded.ok_or(EngineError::NoEmbeddedDatabase)?;
    let client = db.attach(name, AttachData::File(file.as_ref())).await?;
    Ok(ResolvedSource::Client(client))
}

async fn attach_rows(
    embedded: Option<Arc<dyn EmbeddedDatabase>>,
    name: &str,
    table: &Table,
) -> EngineResult<ResolvedSource> {
    let db = embedded.ok_or(EngineError::NoEmbeddedDatabase)?;
    let client = db.attach(name, AttachData::Rows(table)).await?;
    Ok(ResolvedSource::Client(client))
}

fn unsupported(mime_type: &str) -> EngineError {
    EngineError::UnsupportedFileType {
        mime_type: mime_type.to_owned(),
    }
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCsv {
        reads: AtomicUsize,
    }

    impl FileAttachment for CountingCsv {
        fn name(&self) -> &str {
            "people@2.csv"
        }

        fn mime_type(&self) -> &str {
            "text/csv"
        }

        fn text(&self) -> EngineResult<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok("a,b\n1,2\n".to_owned())
        }

        fn bytes(&self) -> EngineResult<Vec<u8>> {
            Ok(self.text()?.into_bytes())
        }
    }

    fn one_row_table(n: usize) -> Table {
        Table::new(
            vec!["a".to_owned()],
            (0..n).map(|i| vec![crate::value::Value::Number(i as f64)]).collect(),
        )
    }

    #[test]
    fn registration_derives_table_names() {
        let loader = SourceLoader::default();
        let file: Arc<dyn FileAttachment> = Arc::new(CountingCsv::default());
        let file_id = loader.register(DataSource::File(file));
        let rows_id = loader.register(one_row_table(1));
        assert_eq!(loader.source_name(file_id).as_deref(), Some("people"));
        assert_eq!(loader.source_name(rows_id).as_deref(), Some(DEFAULT_TABLE_NAME));
        assert_eq!(loader.stats().sources, 2);
    }

    #[test]
    fn repeat_loads_are_served_from_cache() {
        let loader = SourceLoader::default();
        let file = Arc::new(CountingCsv::default());
        let id = loader.register(DataSource::File(file.clone() as Arc<dyn FileAttachment>));

        let first = block_on(loader.load(id, LoadMode::Table)).unwrap();
        let second = block_on(loader.load(id, LoadMode::Table)).unwrap();
        assert_eq!(file.reads.load(Ordering::SeqCst), 1);
        assert_eq!(first.rows().unwrap().row_count(), 1);
        assert_eq!(second.rows().unwrap().row_count(), 1);
        assert_eq!(loader.stats().cached, 1);

        // Chart mode is a separate cache slot and re-reads the file.
        block_on(loader.load(id, LoadMode::Chart)).unwrap();
        assert_eq!(file.reads.load(Ordering::SeqCst), 2);
        assert_eq!(loader.stats().cached, 2);
    }

    #[test]
    fn a_changed_row_count_re_resolves() {
        let loader = SourceLoader::default();
        let id = loader.register(one_row_table(1));
        let first = block_on(loader.load(id, LoadMode::Table)).unwrap();
        assert_eq!(first.rows().unwrap().row_count(), 1);

        loader.update_rows(id, one_row_table(3)).unwrap();
        let second = block_on(loader.load(id, LoadMode::Table)).unwrap();
        assert_eq!(second.rows().unwrap().row_count(), 3);
    }

    #[test]
    fn a_zero_ttl_expires_every_entry() {
        let loader = SourceLoader::new(LoaderOptions {
            ttl: Duration::ZERO,
            ..LoaderOptions::default()
        });
        let file = Arc::new(CountingCsv::default());
        let id = loader.register(DataSource::File(file.clone() as Arc<dyn FileAttachment>));
        block_on(loader.load(id, LoadMode::Table)).unwrap();
        block_on(loader.load(id, LoadMode::Table)).unwrap();
        assert_eq!(file.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn capacity_drops_the_least_recently_used() {
        let loader = SourceLoader::new(LoaderOptions {
            max_entries: 1,
            ..LoaderOptions::default()
        });
        let a = loader.register(one_row_table(1));
        let b = loader.register(one_row_table(2));
        block_on(loader.load(a, LoadMode::Table)).unwrap();
        block_on(loader.load(b, LoadMode::Table)).unwrap();
        assert_eq!(loader.stats().cached, 1);
    }

    #[test]
    fn unknown_sources_and_unsupported_files_error() {
        let loader = SourceLoader::default();
        let err = block_on(loader.load(SourceId::from_raw(99), LoadMode::Table)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource { id: 99 }));

        let id = loader.register(DataSource::File(Arc::new(
            crate::source::LocalFileAttachment::new("notes.txt"),
        )));
        let err = block_on(loader.load(id, LoadMode::Chart)).unwrap_err();
        assert!(matches!(err, EngineError::Shared(inner)
            if matches!(*inner, EngineError::UnsupportedFileType { .. })));
    }

    #[test]
    fn sql_mode_needs_an_embedded_database() {
        let loader = SourceLoader::default();
        let id = loader.register(one_row_table(1));
        let err = block_on(loader.load(id, LoadMode::Sql)).unwrap_err();
        assert!(matches!(err, EngineError::Shared(inner)
            if matches!(*inner, EngineError::NoEmbeddedDatabase)));
    }

    #[test]
    fn invalidate_and_clear_drop_cached_loads() {
        let loader = SourceLoader::default();
        let a = loader.register(one_row_table(1));
        let b = loader.register(one_row_table(2));
        block_on(loader.load(a, LoadMode::Table)).unwrap();
        block_on(loader.load(b, LoadMode::Table)).unwrap();
        assert_eq!(loader.stats().cached, 2);

        loader.invalidate(a);
        assert_eq!(loader.stats().cached, 1);

        loader.clear();
        assert_eq!(loader.stats().cached, 0);
        assert_eq!(loader.stats().sources, 2);

        loader.remove(b);
        assert_eq!(loader.stats().sources, 1);
    }
}
