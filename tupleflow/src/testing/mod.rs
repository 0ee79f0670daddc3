//! Testing utilities for flow assemblies.
//!
//! This module provides:
//! - Scope assertions by stage name
//! - Error code assertions
//! - Ready-made flows with declared sources

mod assertions;
mod fixtures;

pub use assertions::{
    assert_error_code, assert_grouping_key, assert_no_primary_key, assert_primary_key,
    assert_values_fields,
};
pub use fixtures::{flow_with_sources, orders_customers_flow};
