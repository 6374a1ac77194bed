//! Pipeline orchestration.
//!
//! A [`Pipeline`] runs a strictly linear sequence of stages:
//!
//! 1. for every source: read → rename → derive → filter → select
//! 2. join the prepared sources onto the first one, in order
//! 3. evaluate summaries over the merged table, or over one prepared source
//! 4. write the merged table
//!
//! The first failing stage aborts the run before anything is written. Its error is wrapped in
//! [`PipelineError::Stage`], naming the stage and source.

pub mod config;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{read_source, SourceSpec};
use crate::observability::{severity_for_error, PipelineObserver, Severity, Stage, StageContext, StageStats};
use crate::processing::{derive, filter_by, join, rename, select, DeriveColumn, JoinOptions, Predicate, Rename, Summary};
use crate::sink::{write_dataset, SinkSpec};
use crate::types::{DataSet, Value};

pub use config::PipelineConfig;

/// One input table and the stages that prepare it for joining.
#[derive(Debug, Clone)]
pub struct SourceStep {
    /// Name used by joins and in error messages.
    pub name: String,
    pub spec: SourceSpec,
    pub renames: Vec<Rename>,
    pub derive: Vec<DeriveColumn>,
    pub filters: Vec<Predicate>,
    /// Columns to keep, in order. `None` keeps every column.
    pub select: Option<Vec<String>>,
}

impl SourceStep {
    pub fn new(name: impl Into<String>, spec: SourceSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            renames: Vec::new(),
            derive: Vec::new(),
            filters: Vec::new(),
            select: None,
        }
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.push(Rename::new(from, to));
        self
    }

    pub fn derive(mut self, column: DeriveColumn) -> Self {
        self.derive.push(column);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Join the running result with a prepared source.
#[derive(Debug, Clone)]
pub struct JoinStep {
    /// Name of the right-hand [`SourceStep`].
    pub right: String,
    pub on: Vec<String>,
    pub options: JoinOptions,
}

impl JoinStep {
    pub fn left<S: Into<String>>(right: impl Into<String>, on: impl IntoIterator<Item = S>) -> Self {
        Self {
            right: right.into(),
            on: on.into_iter().map(Into::into).collect(),
            options: JoinOptions::left(),
        }
    }

    pub fn with_options(mut self, options: JoinOptions) -> Self {
        self.options = options;
        self
    }
}

/// Run-level options.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Prepare sources on the rayon thread pool. Results and errors are still taken in source
    /// order, so the outcome matches a sequential run.
    pub parallel_reads: bool,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("parallel_reads", &self.parallel_reads)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            parallel_reads: false,
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Rows of each prepared source, in source order.
    pub source_rows: Vec<(String, usize)>,
    pub output_rows: usize,
    pub output_path: PathBuf,
    /// Summary values, in declaration order.
    pub summaries: Vec<(String, Value)>,
}

// The merged table plus the prepared sources that summaries read.
struct Built {
    merged: DataSet,
    source_rows: Vec<(String, usize)>,
    summary_sources: HashMap<String, DataSet>,
}

/// A configured merge run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub sources: Vec<SourceStep>,
    pub joins: Vec<JoinStep>,
    pub summaries: Vec<Summary>,
    pub sink: SinkSpec,
    pub options: PipelineOptions,
}

impl Pipeline {
    /// A pipeline with no joins or summaries; add them with the builder methods.
    pub fn new(base: SourceStep, sink: SinkSpec) -> Self {
        Self {
            sources: vec![base],
            joins: Vec::new(),
            summaries: Vec::new(),
            sink,
            options: PipelineOptions::default(),
        }
    }

    /// Left-join (or per `step.options`) `source` onto the running result.
    pub fn join(mut self, source: SourceStep, step: JoinStep) -> Self {
        self.sources.push(source);
        self.joins.push(step);
        self
    }

    pub fn summary(mut self, summary: Summary) -> Self {
        self.summaries.push(summary);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Check source names and join wiring without touching any file.
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |message: String| PipelineError::InvalidConfig { message };

        let base = self
            .sources
            .first()
            .ok_or_else(|| invalid("pipeline has no sources".to_string()))?;

        let mut names = HashSet::new();
        for s in &self.sources {
            if !names.insert(s.name.as_str()) {
                return Err(invalid(format!("source name '{}' is used twice", s.name)));
            }
        }

        let mut joined = HashSet::new();
        for j in &self.joins {
            if j.right == base.name {
                return Err(invalid(format!("source '{}' is the base table and cannot be joined", j.right)));
            }
            if !names.contains(j.right.as_str()) {
                return Err(invalid(format!("join references unknown source '{}'", j.right)));
            }
            if !joined.insert(j.right.as_str()) {
                return Err(invalid(format!("source '{}' is joined twice", j.right)));
            }
            if j.on.is_empty() {
                return Err(invalid(format!("join with '{}' has no key columns", j.right)));
            }
        }

        if let Some(unused) = self.sources[1..].iter().find(|s| !joined.contains(s.name.as_str())) {
            return Err(invalid(format!("source '{}' is never joined", unused.name)));
        }

        for summary in &self.summaries {
            if let Some(source) = summary.source.as_deref() {
                if !names.contains(source) {
                    return Err(invalid(format!(
                        "summary '{}' references unknown source '{source}'",
                        summary.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Run every stage up to (not including) the sink and return the merged table.
    pub fn build(&self) -> PipelineResult<(DataSet, Vec<(String, usize)>)> {
        let built = self.build_all()?;
        Ok((built.merged, built.source_rows))
    }

    fn build_all(&self) -> PipelineResult<Built> {
        self.track(StageContext::new(Stage::Config), 0, self.validate(), |_| 0)?;

        let prepared: Vec<PipelineResult<DataSet>> = if self.options.parallel_reads {
            self.sources.par_iter().map(|s| self.prepare(s)).collect()
        } else {
            // Sequential runs stop at the first failing source.
            let mut out = Vec::with_capacity(self.sources.len());
            for s in &self.sources {
                let res = self.prepare(s);
                let failed = res.is_err();
                out.push(res);
                if failed {
                    break;
                }
            }
            out
        };
        let prepared = prepared.into_iter().collect::<PipelineResult<Vec<_>>>()?;

        let source_rows = self
            .sources
            .iter()
            .zip(&prepared)
            .map(|(s, ds)| (s.name.clone(), ds.row_count()))
            .collect();

        let mut tables: HashMap<&str, DataSet> = self
            .sources
            .iter()
            .map(|s| s.name.as_str())
            .zip(prepared)
            .collect();
        let summary_sources: HashMap<String, DataSet> = self
            .summaries
            .iter()
            .filter_map(|s| s.source.as_deref())
            .filter_map(|name| tables.get(name).map(|ds| (name.to_string(), ds.clone())))
            .collect();
        let mut merged = tables
            .remove(self.sources[0].name.as_str())
            .ok_or_else(|| PipelineError::InvalidConfig {
                message: "base source missing after preparation".to_string(),
            })?;

        for step in &self.joins {
            let right = tables.remove(step.right.as_str()).ok_or_else(|| PipelineError::InvalidConfig {
                message: format!("join references unknown source '{}'", step.right),
            })?;
            let ctx = StageContext::new(Stage::Join).with_source(&step.right);
            let rows_in = merged.row_count();
            merged = self.track(ctx, rows_in, join(&merged, &right, &step.on, &step.options), DataSet::row_count)?;
        }

        Ok(Built {
            merged,
            source_rows,
            summary_sources,
        })
    }

    /// Run the whole pipeline and write the output file.
    pub fn run(&self) -> PipelineResult<RunReport> {
        let Built {
            merged,
            source_rows,
            summary_sources,
        } = self.build_all()?;

        let mut summaries = Vec::with_capacity(self.summaries.len());
        for s in &self.summaries {
            let ctx = StageContext::new(Stage::Summary).with_source(&s.name);
            let table = match s.source.as_deref() {
                None => Ok(&merged),
                Some(name) => summary_sources.get(name).ok_or_else(|| PipelineError::InvalidConfig {
                    message: format!("summary '{}' references unknown source '{name}'", s.name),
                }),
            };
            let rows_in = table.as_ref().map_or(0, |t| t.row_count());
            let value = self.track(ctx, rows_in, table.and_then(|t| s.evaluate(t)), |_| 1)?;
            summaries.push((s.name.clone(), value));
        }

        let ctx = StageContext::new(Stage::Write).with_path(&self.sink.path);
        let rows = merged.row_count();
        self.track(ctx, rows, write_dataset(&merged, &self.sink), |_| rows)?;

        Ok(RunReport {
            source_rows,
            output_rows: rows,
            output_path: self.sink.path.clone(),
            summaries,
        })
    }

    fn prepare(&self, step: &SourceStep) -> PipelineResult<DataSet> {
        let ctx = |stage| StageContext::new(stage).with_source(&step.name);

        let mut ds = self.track(
            ctx(Stage::Read).with_path(&step.spec.path),
            0,
            read_source(&step.spec),
            DataSet::row_count,
        )?;

        if !step.renames.is_empty() {
            let n = ds.row_count();
            ds = self.track(ctx(Stage::Rename), n, rename(&ds, &step.renames), DataSet::row_count)?;
        }
        for column in &step.derive {
            let n = ds.row_count();
            ds = self.track(ctx(Stage::Derive), n, derive(&ds, column), DataSet::row_count)?;
        }
        if !step.filters.is_empty() {
            let n = ds.row_count();
            ds = self.track(ctx(Stage::Filter), n, filter_by(&ds, &step.filters), DataSet::row_count)?;
        }
        if let Some(columns) = &step.select {
            let n = ds.row_count();
            ds = self.track(ctx(Stage::Project), n, select(&ds, columns), DataSet::row_count)?;
        }
        Ok(ds)
    }

    // Reports the stage outcome and tags errors with the stage that raised them.
    fn track<T>(
        &self,
        ctx: StageContext,
        rows_in: usize,
        result: PipelineResult<T>,
        rows_out: impl FnOnce(&T) -> usize,
    ) -> PipelineResult<T> {
        let obs = self.options.observer.as_ref();
        match result {
            Ok(value) => {
                if let Some(obs) = obs {
                    let stats = StageStats {
                        rows_in,
                        rows_out: rows_out(&value),
                    };
                    obs.on_success(&ctx, stats);
                }
                Ok(value)
            }
            Err(e) => {
                let err = PipelineError::Stage {
                    stage: ctx.stage,
                    source_name: ctx.source.clone(),
                    source: Box::new(e),
                };
                if let Some(obs) = obs {
                    let sev = severity_for_error(&err);
                    obs.on_failure(&ctx, sev, &err);
                    if sev >= self.options.alert_at_or_above {
                        obs.on_alert(&ctx, sev, &err);
                    }
                }
                Err(err)
            }
        }
    }
}
