use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::EngineError;
use crate::source::{LoadMode, SourceId};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Context about a source load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceContext {
    /// The source being loaded.
    pub id: SourceId,
    /// The mode it is being loaded in.
    pub mode: LoadMode,
}

/// Minimal stats reported on a completed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Number of resolved rows, when the resolved form has rows at all.
    /// Client passthroughs resolve without materializing any.
    pub rows: Option<usize>,
}

/// Why a cached load was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The entry outlived the configured time-to-live.
    Expired,
    /// The cache was over capacity and this was the least recently used.
    Capacity,
    /// The source's rows changed since the entry was built.
    Stale,
    /// The caller invalidated the source.
    Explicit,
}

/// Observer interface for source loading and query execution.
///
/// Implementors can record metrics, logs, or trigger alerts. Every hook has
/// an empty default, so observers implement only what they care about.
pub trait EngineObserver: Send + Sync {
    /// Called when a load begins resolving (cache miss).
    fn on_load_started(&self, _ctx: &SourceContext) {}

    /// Called when a load resolves successfully.
    fn on_load_completed(&self, _ctx: &SourceContext, _stats: LoadStats) {}

    /// Called when a load is served from cache.
    fn on_cache_hit(&self, _ctx: &SourceContext) {}

    /// Called when a cached load is dropped.
    fn on_cache_evicted(&self, _ctx: &SourceContext, _reason: EvictionReason) {}

    /// Called when a compiled query starts executing.
    fn on_query_started(&self, _source: &str) {}

    /// Called for each row batch a streaming query yields.
    fn on_query_row_batch(&self, _source: &str, _rows: usize) {}

    /// Called when a query finishes, with the total row count.
    fn on_query_finished(&self, _source: &str, _total_rows: usize) {}

    /// Called when a load fails.
    fn on_failure(&self, _ctx: &SourceContext, _severity: Severity, _error: &EngineError) {}

    /// Called when a failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn EngineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl EngineObserver for CompositeObserver {
    fn on_load_started(&self, ctx: &SourceContext) {
        for o in &self.observers {
            o.on_load_started(ctx);
        }
    }

    fn on_load_completed(&self, ctx: &SourceContext, stats: LoadStats) {
        for o in &self.observers {
            o.on_load_completed(ctx, stats);
        }
    }

    fn on_cache_hit(&self, ctx: &SourceContext) {
        for o in &self.observers {
            o.on_cache_hit(ctx);
        }
    }

    fn on_cache_evicted(&self, ctx: &SourceContext, reason: EvictionReason) {
        for o in &self.observers {
            o.on_cache_evicted(ctx, reason);
        }
    }

    fn on_query_started(&self, source: &str) {
        for o in &self.observers {
            o.on_query_started(source);
        }
    }

    fn on_query_row_batch(&self, source: &str, rows: usize) {
        for o in &self.observers {
            o.on_query_row_batch(source, rows);
        }
    }

    fn on_query_finished(&self, source: &str, total_rows: usize) {
        for o in &self.observers {
            o.on_query_finished(source, total_rows);
        }
    }

    fn on_failure(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs engine events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl EngineObserver for StdErrObserver {
    fn on_load_started(&self, ctx: &SourceContext) {
        eprintln!("[load][start] id={} mode={:?}", ctx.id, ctx.mode);
    }

    fn on_load_completed(&self, ctx: &SourceContext, stats: LoadStats) {
        match stats.rows {
            Some(rows) => eprintln!(
                "[load][ok] id={} mode={:?} rows={}",
                ctx.id, ctx.mode, rows
            ),
            None => eprintln!("[load][ok] id={} mode={:?}", ctx.id, ctx.mode),
        }
    }

    fn on_cache_hit(&self, ctx: &SourceContext) {
        eprintln!("[cache][hit] id={} mode={:?}", ctx.id, ctx.mode);
    }

    fn on_cache_evicted(&self, ctx: &SourceContext, reason: EvictionReason) {
        eprintln!(
            "[cache][evict] id={} mode={:?} reason={:?}",
            ctx.id, ctx.mode, reason
        );
    }

    fn on_query_started(&self, source: &str) {
        eprintln!("[query][start] source={source:?}");
    }

    fn on_query_row_batch(&self, source: &str, rows: usize) {
        eprintln!("[query][batch] source={source:?} rows={rows}");
    }

    fn on_query_finished(&self, source: &str, total_rows: usize) {
        eprintln!("[query][done] source={source:?} rows={total_rows}");
    }

    fn on_failure(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        eprintln!(
            "[load][{:?}] id={} mode={:?} err={}",
            severity, ctx.id, ctx.mode, error
        );
    }

    fn on_alert(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        eprintln!(
            "[ALERT][load][{:?}] id={} mode={:?} err={}",
            severity, ctx.id, ctx.mode, error
        );
    }
}

/// Appends engine events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl EngineObserver for FileObserver {
    fn on_load_started(&self, ctx: &SourceContext) {
        self.append_line(&format!(
            "{} load-start id={} mode={:?}",
            unix_ts(),
            ctx.id,
            ctx.mode
        ));
    }

    fn on_load_completed(&self, ctx: &SourceContext, stats: LoadStats) {
        self.append_line(&format!(
            "{} load-ok id={} mode={:?} rows={:?}",
            unix_ts(),
            ctx.id,
            ctx.mode,
            stats.rows
        ));
    }

    fn on_cache_hit(&self, ctx: &SourceContext) {
        self.append_line(&format!(
            "{} cache-hit id={} mode={:?}",
            unix_ts(),
            ctx.id,
            ctx.mode
        ));
    }

    fn on_cache_evicted(&self, ctx: &SourceContext, reason: EvictionReason) {
        self.append_line(&format!(
            "{} cache-evict id={} mode={:?} reason={:?}",
            unix_ts(),
            ctx.id,
            ctx.mode,
            reason
        ));
    }

    fn on_query_started(&self, source: &str) {
        self.append_line(&format!("{} query-start source={source:?}", unix_ts()));
    }

    fn on_query_row_batch(&self, source: &str, rows: usize) {
        self.append_line(&format!(
            "{} query-batch source={source:?} rows={rows}",
            unix_ts()
        ));
    }

    fn on_query_finished(&self, source: &str, total_rows: usize) {
        self.append_line(&format!(
            "{} query-done source={source:?} rows={total_rows}",
            unix_ts()
        ));
    }

    fn on_failure(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        self.append_line(&format!(
            "{} fail severity={:?} id={} mode={:?} err={}",
            unix_ts(),
            severity,
            ctx.id,
            ctx.mode,
            error
        ));
    }

    fn on_alert(&self, ctx: &SourceContext, severity: Severity, error: &EngineError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} id={} mode={:?} err={}",
            unix_ts(),
            severity,
            ctx.id,
            ctx.mode,
            error
        ));
    }
}

/// Classifies an error for observer reporting. Infrastructure failures rate
/// `Critical`; everything else is `Error`.
pub fn severity_for_error(e: &EngineError) -> Severity {
    match e {
        EngineError::Io(_) => Severity::Critical,
        EngineError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        #[cfg(feature = "parquet")]
        EngineError::Parquet(err) => {
            // Parquet errors often wrap IO, but not always in a structured
            // way. If IO shows up in the source chain, treat it as Critical.
            if error_chain_contains_io(err) {
                Severity::Critical
            } else {
                Severity::Error
            }
        }
        EngineError::Shared(inner) => severity_for_error(inner),
        _ => Severity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        failures: AtomicUsize,
        alerts: AtomicUsize,
    }

    impl EngineObserver for Counting {
        fn on_failure(&self, _ctx: &SourceContext, _severity: Severity, _error: &EngineError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_alert(&self, _ctx: &SourceContext, _severity: Severity, _error: &EngineError) {
            self.alerts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ctx() -> SourceContext {
        SourceContext {
            id: SourceId::from_raw(7),
            mode: LoadMode::Table,
        }
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn io_failures_are_critical_even_when_shared() {
        let io = EngineError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(severity_for_error(&io), Severity::Critical);
        let shared = EngineError::Shared(Arc::new(io));
        assert_eq!(severity_for_error(&shared), Severity::Critical);
        assert_eq!(
            severity_for_error(&EngineError::MissingFromTable),
            Severity::Error
        );
    }

    #[test]
    fn the_composite_fans_out() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let composite = CompositeObserver::new(vec![a.clone(), b.clone()]);
        let err = EngineError::MissingFromTable;
        composite.on_failure(&ctx(), Severity::Error, &err);
        composite.on_alert(&ctx(), Severity::Critical, &err);
        assert_eq!(a.failures.load(Ordering::SeqCst), 1);
        assert_eq!(a.alerts.load(Ordering::SeqCst), 1);
        assert_eq!(b.failures.load(Ordering::SeqCst), 1);
        assert_eq!(b.alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_default_observer_alert_forwards_to_failure() {
        struct OnlyFailure(AtomicUsize);
        impl EngineObserver for OnlyFailure {
            fn on_failure(&self, _ctx: &SourceContext, _severity: Severity, _error: &EngineError) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let obs = OnlyFailure(AtomicUsize::new(0));
        obs.on_alert(&ctx(), Severity::Critical, &EngineError::MissingFromTable);
        assert_eq!(obs.0.load(Ordering::SeqCst), 1);
    }
}
