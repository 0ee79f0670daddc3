//! Field-set algebra.
//!
//! This module provides:
//! - `Field` and `FieldSet`, the ordered unique-name value type
//! - union, difference, and suffix-based de-duplication
//! - `FieldSpec` normalization of the accepted field specification forms
//! - selectors and aggregation mappings

mod field_set;
mod spec;
mod types;

pub use field_set::{Field, FieldSet, FieldSetError, DEFAULT_DEDUP_SUFFIX};
pub use spec::{FieldMapping, FieldSpec, Selector};
pub use types::FieldType;
