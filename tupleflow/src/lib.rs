//! # Tupleflow
//!
//! A declarative builder for multi-stage tuple-processing dataflow graphs.
//!
//! Tupleflow checks field schemas while a flow is assembled, so a mistyped
//! field, an ambiguous join or a bad primary key fails at build time rather
//! than in the middle of a batch run:
//!
//! - **Scopes**: every stage tracks its output fields, primary key and grouping
//! - **Stage tree**: assemblies and branches are named and resolvable by name
//! - **Operators**: row-wise, aggregation, join and union operators with
//!   propagated schemas
//! - **Graph output**: a serializable pipe graph with a stable fingerprint
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tupleflow::prelude::*;
//!
//! let mut flow = Flow::new("report");
//! flow.source("orders", ["order_id", "cust_id", "amount"])?;
//! flow.source("customers", ["cust_id", "name"])?;
//!
//! flow.assembly("orders", |a| {
//!     a.primary("order_id")?;
//!     Ok(())
//! })?;
//! flow.assembly("customers", |a| {
//!     a.primary("cust_id")?;
//!     Ok(())
//! })?;
//! flow.assembly("totals", |a| {
//!     a.join_with(&["orders", "customers"], "cust_id", JoinOptions::default(), |g| {
//!         g.sum("amount", FieldType::Double)?;
//!         Ok(())
//!     })?;
//!     Ok(())
//! })?;
//!
//! let graph = flow.complete()?;
//! println!("{}", graph.to_json()?);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assembly;
pub mod errors;
pub mod fields;
pub mod flow;
pub mod graph;
pub mod observability;
pub mod operations;
pub mod scope;
pub mod testing;
pub mod tree;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assembly::{
        Aggregations, Assembly, GroupByOptions, GroupingSpec, InsertValue, JoinOptions, Joiner,
    };
    pub use crate::errors::AssemblyError;
    pub use crate::fields::{Field, FieldMapping, FieldSet, FieldSpec, FieldType, Selector};
    pub use crate::flow::{Flow, FlowConfig};
    pub use crate::graph::{PipeGraph, PipeId, PipeKind};
    pub use crate::observability::{init_logging, LoggingConfig};
    pub use crate::operations::{AssertionLevel, Expr, Operation, OperationKind, OperationSpec};
    pub use crate::scope::Scope;
    pub use crate::tree::{StageId, StageKind};
}
