//! `school-econ-merge` joins school academic-performance records with neighborhood socioeconomic
//! indicators at the ZIP-code level, producing one flat table for analysis.
//!
//! The work is a deterministic multi-source join pipeline:
//!
//! - read CSV files and workbook sheets into an in-memory [`types::DataSet`] using a
//!   user-provided [`types::Schema`] ([`ingestion`])
//! - rename columns, derive normalized join keys, filter rows to a geographic scope and project
//!   the needed columns ([`processing`])
//! - chain left joins on shared key columns ([`processing::join()`])
//! - write the merged table to a single CSV or XLSX file ([`sink`])
//!
//! [`pipeline::Pipeline`] wires those stages together, and [`pipeline::PipelineConfig`] builds one
//! from a JSON file.
//!
//! ## What you can read
//!
//! - **CSV**: `.csv`
//! - **Workbooks** (Cargo feature `excel`, on by default): `.xlsx`, `.xls`, `.xlsm`, `.xlsb`,
//!   `.ods`, one named sheet per source
//!
//! Empty cells read as [`types::Value::Null`], which is also the missing marker written into
//! right-side columns when a left join finds no match.
//!
//! ## Example: two report-card sheets joined per school
//!
//! ```no_run
//! use school_econ_merge::ingestion::SourceSpec;
//! use school_econ_merge::pipeline::{JoinStep, Pipeline, SourceStep};
//! use school_econ_merge::processing::Predicate;
//! use school_econ_merge::sink::SinkSpec;
//! use school_econ_merge::types::{DataType, Field, Schema, Value};
//!
//! # fn main() -> Result<(), school_econ_merge::PipelineError> {
//! let chicago_schools = |sheet: &str, score: &str| {
//!     let schema = Schema::new(vec![
//!         Field::new("RCDTS", DataType::Utf8),
//!         Field::new("School Name", DataType::Utf8),
//!         Field::new("City", DataType::Utf8),
//!         Field::new("Level", DataType::Utf8),
//!         Field::new(score, DataType::Float64),
//!     ]);
//!     SourceStep::new(sheet, SourceSpec::new("report_card.xlsx", schema).with_sheet(sheet))
//!         .filter(Predicate::equals("City", Value::Utf8("Chicago".into())))
//!         .filter(Predicate::equals("Level", Value::Utf8("School".into())))
//!         .select(["RCDTS", "School Name", "City", score])
//! };
//!
//! let report = Pipeline::new(
//!     chicago_schools("ELAMathScience", "% ELA Proficiency"),
//!     SinkSpec::csv("report_card_proficiency_scores.csv"),
//! )
//! .join(
//!     chicago_schools("ELAMathScience (2)", "% Science Proficiency"),
//!     JoinStep::left("ELAMathScience (2)", ["RCDTS", "School Name", "City"]),
//! )
//! .run()?;
//! println!("rows={}", report.output_rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: source readers
//! - [`types`]: schema + in-memory dataset types
//! - [`processing`]: filter/select/rename/derive/join/reduce
//! - [`sink`]: output writers
//! - [`pipeline`]: orchestration and JSON configuration
//! - [`observability`]: stage observers
//! - [`error`]: the shared error type

pub mod error;
pub mod ingestion;
pub mod observability;
pub mod pipeline;
pub mod processing;
pub mod sink;
pub mod types;

pub use error::{PipelineError, PipelineResult};
