//! planlens Analyzer - EXPLAIN ANALYZE parsing and plan metrics
//!
//! This crate provides functionality for:
//! - Parsing PostgreSQL EXPLAIN ANALYZE output in JSON and text formats
//! - Normalizing both formats into one strongly-typed plan tree
//! - Computing exclusive time, estimate accuracy and bottleneck flags per node

pub mod explain;

pub use explain::*;
