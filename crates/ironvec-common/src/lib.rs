//! IronVec Common - Core types and utilities shared across all crates
//!
//! This crate provides the foundational types used throughout IronVec:
//! - `LogicalType`: The column type system
//! - `Value`: Runtime scalar representation
//! - `Error`: Unified error types
//! - `ExecutionConfig`: Settings for the evaluator and scheduler

pub mod config;
pub mod error;
pub mod types;
pub mod value;

pub use config::{ExecutionConfig, OperatorOrder, DEFAULT_VECTOR_SIZE};
pub use error::{Error, Result};
pub use types::LogicalType;
pub use value::Value;
