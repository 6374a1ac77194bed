//! JSON pipeline configuration.
//!
//! Paths in the file are resolved against the directory containing the file, never the process
//! working directory.
//!
//! ```json
//! {
//!   "sources": [
//!     {
//!       "name": "ela_math",
//!       "path": "raw/report_card.xlsx",
//!       "sheet": "ELAMathScience",
//!       "columns": [
//!         {"name": "RCDTS", "type": "utf8"},
//!         {"name": "City", "type": "utf8"},
//!         {"name": "Level", "type": "utf8"},
//!         {"name": "% ELA Proficiency", "type": "float64"}
//!       ],
//!       "coerce_invalid": true,
//!       "filters": [
//!         {"column": "City", "equals": "Chicago"},
//!         {"column": "Level", "equals": "School"}
//!       ],
//!       "select": ["RCDTS", "City", "% ELA Proficiency"]
//!     }
//!   ],
//!   "joins": [],
//!   "output": {"path": "out/merged.csv"}
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{ReadOptions, SourceFormat, SourceSpec};
use crate::observability::{CompositeObserver, FileObserver, PipelineObserver, Severity, TracingObserver};
use crate::processing::{ConflictPolicy, DeriveColumn, JoinKind, JoinOptions, Predicate, PredicateConfig, Rename, Summary};
use crate::sink::{SinkFormat, SinkSpec};
use crate::types::{Field, Schema};

use super::{JoinStep, Pipeline, PipelineOptions, SourceStep};

/// Top-level pipeline file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Input tables; the first one is the base of the join chain.
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
    pub output: OutputConfig,
    #[serde(default)]
    pub summaries: Vec<Summary>,
    #[serde(default)]
    pub parallel_reads: bool,
    /// Append stage events to this file in addition to `tracing` output.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_alert_threshold")]
    pub alert_at_or_above: Severity,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_alert_threshold() -> Severity {
    Severity::Critical
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub format: Option<SourceFormat>,
    /// Columns to read from the header row, with their types.
    pub columns: Vec<Field>,
    #[serde(default)]
    pub skip_rows: usize,
    #[serde(default)]
    pub coerce_invalid: bool,
    #[serde(default)]
    pub rename: Vec<Rename>,
    #[serde(default)]
    pub derive: Vec<DeriveColumn>,
    #[serde(default)]
    pub filters: Vec<PredicateConfig>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinConfig {
    pub right: String,
    pub on: Vec<String>,
    #[serde(default)]
    pub how: JoinKind,
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: Option<SinkFormat>,
    #[serde(default)]
    pub null_marker: String,
}

impl PipelineConfig {
    /// Load a config file; relative paths inside it resolve against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PipelineError::SourceNotFound {
            path: path.to_path_buf(),
            message: format!("cannot read config: {e}"),
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json_str(&text, base_dir)
    }

    /// Parse config text; relative paths resolve against `base_dir`.
    pub fn from_json_str(text: &str, base_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let mut config: PipelineConfig = serde_json::from_str(text)?;
        config.base_dir = base_dir.into();
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Build the runnable [`Pipeline`], including its observers.
    pub fn into_pipeline(self) -> PipelineResult<Pipeline> {
        let sources = self
            .sources
            .iter()
            .map(|s| self.source_step(s))
            .collect::<PipelineResult<Vec<_>>>()?;

        let joins = self
            .joins
            .iter()
            .map(|j| JoinStep {
                right: j.right.clone(),
                on: j.on.clone(),
                options: JoinOptions {
                    kind: j.how,
                    on_conflict: j.on_conflict.clone(),
                },
            })
            .collect();

        let sink = SinkSpec {
            path: self.resolve(&self.output.path),
            format: self.output.format,
            null_marker: self.output.null_marker.clone(),
        };

        let mut observers: Vec<Arc<dyn PipelineObserver>> = vec![Arc::new(TracingObserver)];
        if let Some(log) = &self.log_file {
            observers.push(Arc::new(FileObserver::new(self.resolve(log))));
        }

        Ok(Pipeline {
            sources,
            joins,
            summaries: self.summaries.clone(),
            sink,
            options: PipelineOptions {
                parallel_reads: self.parallel_reads,
                observer: Some(Arc::new(CompositeObserver::new(observers))),
                alert_at_or_above: self.alert_at_or_above,
            },
        })
    }

    fn source_step(&self, s: &SourceConfig) -> PipelineResult<SourceStep> {
        let filters = s
            .filters
            .iter()
            .cloned()
            .map(Predicate::try_from)
            .collect::<PipelineResult<Vec<_>>>()?;

        let spec = SourceSpec {
            path: self.resolve(&s.path),
            sheet: s.sheet.clone(),
            format: s.format,
            schema: Schema::new(s.columns.clone()),
            options: ReadOptions {
                skip_rows: s.skip_rows,
                coerce_invalid: s.coerce_invalid,
            },
        };

        Ok(SourceStep {
            name: s.name.clone(),
            spec,
            renames: s.rename.clone(),
            derive: s.derive.clone(),
            filters,
            select: s.select.clone(),
        })
    }
}
