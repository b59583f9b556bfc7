//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod transform;
pub mod validate;
