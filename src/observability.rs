//! Stage-level observability hooks.
//!
//! The pipeline reports the outcome of every stage to an optional [`PipelineObserver`]:
//!
//! - `on_success` with row counts
//! - `on_failure` with a computed [`Severity`]
//! - `on_alert` when the severity meets the configured threshold

#[cfg(feature = "excel")]
use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::error::PipelineError;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Read,
    Rename,
    Derive,
    Filter,
    Project,
    Join,
    Summary,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Read => "read",
            Stage::Rename => "rename",
            Stage::Derive => "derive",
            Stage::Filter => "filter",
            Stage::Project => "project",
            Stage::Join => "join",
            Stage::Summary => "summary",
            Stage::Write => "write",
        };
        f.write_str(s)
    }
}

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (stage failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Context about a stage execution.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Stage being run.
    pub stage: Stage,
    /// Source name (or join's right-hand source) the stage worked on, if any.
    pub source: Option<String>,
    /// File the stage read or wrote, if any.
    pub path: Option<PathBuf>,
}

impl StageContext {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            source: None,
            path: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    fn label(&self) -> String {
        let mut out = format!("stage={}", self.stage);
        if let Some(source) = &self.source {
            out.push_str(&format!(" source={source}"));
        }
        if let Some(path) = &self.path {
            out.push_str(&format!(" path={}", path.display()));
        }
        out
    }
}

/// Row counts reported on a successful stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    /// Rows entering the stage (0 for reads).
    pub rows_in: usize,
    /// Rows produced by the stage.
    pub rows_out: usize,
}

/// Observer interface for stage outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called when a stage succeeds.
    fn on_success(&self, _ctx: &StageContext, _stats: StageStats) {}

    /// Called when a stage fails.
    fn on_failure(&self, _ctx: &StageContext, _severity: Severity, _error: &PipelineError) {}

    /// Called when a stage failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Classify an error for observer reporting.
///
/// Failures rooted in I/O are [`Severity::Critical`]; everything else is [`Severity::Error`].
pub fn severity_for_error(e: &PipelineError) -> Severity {
    match e.root() {
        PipelineError::Io(_) | PipelineError::SourceNotFound { .. } | PipelineError::WriteError { .. } => {
            Severity::Critical
        }
        PipelineError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        #[cfg(feature = "excel")]
        PipelineError::Excel(err) => {
            if error_chain_contains_io(err) {
                Severity::Critical
            } else {
                Severity::Error
            }
        }
        _ => Severity::Error,
    }
}

#[cfg(feature = "excel")]
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

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
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

impl PipelineObserver for CompositeObserver {
    fn on_success(&self, ctx: &StageContext, stats: StageStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Forwards stage events to the `tracing` crate.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_success(&self, ctx: &StageContext, stats: StageStats) {
        tracing::info!(
            stage = %ctx.stage,
            source = ctx.source.as_deref().unwrap_or("-"),
            rows_in = stats.rows_in,
            rows_out = stats.rows_out,
            "stage finished"
        );
    }

    fn on_failure(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        tracing::error!(
            stage = %ctx.stage,
            source = ctx.source.as_deref().unwrap_or("-"),
            ?severity,
            %error,
            "stage failed"
        );
    }

    fn on_alert(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        tracing::error!(
            alert = true,
            stage = %ctx.stage,
            source = ctx.source.as_deref().unwrap_or("-"),
            ?severity,
            %error,
            "stage failed"
        );
    }
}

/// Appends stage events to a local log file.
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

impl PipelineObserver for FileObserver {
    fn on_success(&self, ctx: &StageContext, stats: StageStats) {
        self.append_line(&format!(
            "{} ok {} rows_in={} rows_out={}",
            unix_ts(),
            ctx.label(),
            stats.rows_in,
            stats.rows_out
        ));
    }

    fn on_failure(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "{} fail severity={:?} {} err={}",
            unix_ts(),
            severity,
            ctx.label(),
            error
        ));
    }

    fn on_alert(&self, ctx: &StageContext, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} {} err={}",
            unix_ts(),
            severity,
            ctx.label(),
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
