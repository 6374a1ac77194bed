//! In-memory table transformations.
//!
//! Every function takes a [`crate::types::DataSet`] by reference and returns a new one:
//!
//! - [`filter_by`]: conjunctive column predicates ([`filter()`] for arbitrary closures)
//! - [`select`] / [`rename`]: column projection and explicit schema mapping
//! - [`derive`]: derived columns such as normalized join keys ([`map()`] for whole-row mapping)
//! - [`join()`]: left/inner key joins
//! - [`reduce()`], [`ratio_of_sums`], [`weighted_mean`]: summaries
//!
//! ## Example: filter → select → join
//!
//! ```rust
//! use school_econ_merge::processing::{filter_by, join, select, JoinOptions, Predicate};
//! use school_econ_merge::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let text = |s: &str| Value::Utf8(s.to_string());
//! let ela = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("id", DataType::Int64),
//!         Field::new("city", DataType::Utf8),
//!         Field::new("ela", DataType::Int64),
//!     ]),
//!     vec![
//!         vec![Value::Int64(1), text("Chicago"), Value::Int64(80)],
//!         vec![Value::Int64(2), text("Springfield"), Value::Int64(70)],
//!     ],
//! );
//! let sci = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("id", DataType::Int64),
//!         Field::new("city", DataType::Utf8),
//!         Field::new("sci", DataType::Int64),
//!     ]),
//!     vec![vec![Value::Int64(1), text("Chicago"), Value::Int64(90)]],
//! );
//!
//! let chicago = filter_by(&ela, &[Predicate::equals("city", text("Chicago"))]).unwrap();
//! let chicago = select(&chicago, &["id", "city", "ela"]).unwrap();
//! let merged = join(&chicago, &sci, &["id", "city"], &JoinOptions::left()).unwrap();
//!
//! assert_eq!(
//!     merged.rows,
//!     vec![vec![Value::Int64(1), text("Chicago"), Value::Int64(80), Value::Int64(90)]]
//! );
//! ```

pub mod filter;
pub mod join;
pub mod map;
pub mod normalize;
pub mod project;
pub mod reduce;

pub use filter::{filter, filter_by, Predicate, PredicateConfig, ScalarConfig};
pub use join::{join, ConflictPolicy, JoinKind, JoinOptions};
pub use map::{derive, map, with_column, DeriveColumn, Derivation};
pub use normalize::{normalize, KeyTransform};
pub use project::{rename, select, Rename};
pub use reduce::{ratio_of_sums, reduce, weighted_mean, ReduceOp, Summary, SummaryKind};
