//! vtlcore – the evaluation core of a statistical data transformation engine.
//!
//! vtlcore evaluates expression trees over typed, tabular datasets. A dataset
//! is a lazily produced sequence of rows whose columns are tagged as
//! identifiers (the row key), measures (observed or computed quantities) or
//! attributes (descriptive values), and every produced row carries the
//! provenance ([`lineage::Lineage`]) of the transformation that made it.
//!
//! ## Modules
//! * [`domain`] and [`value`] – the scalar domains, their compatibility
//!   lattice and the totally ordered [`value::ScalarValue`].
//! * [`structure`] – components, dataset structures and the quoting rule
//!   for component names.
//! * [`dataset`] – rows and lazily derived datasets.
//! * [`scope`] – name resolution, in metadata-only and value modes.
//! * [`transform`] – the [`transform::Transformation`] tree: operators,
//!   membership and bracket clauses, LAG/LEAD, aggregation and analytics.
//! * [`operators`] – the mergeable statistical reducers shared by the
//!   aggregate and analytic forms.
//! * [`lineage`] – provenance records and the per-node lineage cache.
//! * [`workspace`] – the named statements a scope can look rules up in.
//! * [`config`] – engine-wide settings and logging setup.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use vtlcore::{
//!     DataSet, DataSetMetadata, DataStructureComponent, Domain, EngineScope, MemoryWorkspace,
//!     OffsetTransformation, OrderByItem, ScalarValue, Transformation,
//! };
//! let structure = DataSetMetadata::new([
//!     DataStructureComponent::identifier("k", Domain::String),
//!     DataStructureComponent::identifier("t", Domain::Integer),
//!     DataStructureComponent::measure("m", Domain::Integer),
//! ])
//! .unwrap();
//! let rows = (1i64..=3)
//!     .map(|t| vec![ScalarValue::from("k"), ScalarValue::from(t), ScalarValue::from(t * 10)])
//!     .collect();
//! let ds = DataSet::named("ds", structure, rows).unwrap();
//! let scope = EngineScope::new(Arc::new(MemoryWorkspace::new())).with_value("ds", ds);
//! let lead: Transformation = OffsetTransformation::lead(Transformation::var("ds"), 1)
//!     .partition_by(["k"])
//!     .order_by([OrderByItem::asc("t")])
//!     .into();
//! let result = lead.eval(&scope).unwrap().into_dataset().unwrap();
//! let last = result.collect_rows().unwrap().pop().unwrap();
//! assert_eq!(last.get_by_name("m"), Some(&ScalarValue::Null(Domain::Integer)));
//! ```
//!
//! ## Configuration
//! Settings are loaded with [`config::EngineConfig::load`] from an optional
//! `vtlcore.toml` and `VTL_*` environment variables, and installed with
//! [`config::install`]. Logging goes through `tracing`; call
//! [`config::init_tracing`] to get a subscriber honoring `RUST_LOG`.

pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod lineage;
pub mod operators;
pub mod scope;
pub mod structure;
pub mod transform;
pub mod value;
pub mod workspace;

pub use config::EngineConfig;
pub use dataset::{DataPoint, DataPointBuilder, DataSet};
pub use domain::Domain;
pub use error::{Result, VtlError};
pub use lineage::{Lineage, LineageGroup};
pub use operators::{AggregateOperator, AnalyticOperator};
pub use scope::{CompileScope, DatapointScope, EngineScope, ThisScope, TransformationScheme};
pub use structure::{DataSetMetadata, DataStructureComponent, Role, ValueMetadata};
pub use transform::{
    AggregateTransformation, AnalyticTransformation, BinaryOperator, DatasetClause, OffsetTransformation,
    OrderByItem, Transformation, UnaryOperator,
};
pub use value::{ScalarValue, Value};
pub use workspace::{MemoryWorkspace, Statement, Workspace};
