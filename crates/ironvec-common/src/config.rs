//! Execution configuration
//!
//! Every field has a default, so a config file only needs to name the
//! settings it changes.

use crate::{Error, Result};
use serde::Deserialize;

/// Standard number of rows per batch
pub const DEFAULT_VECTOR_SIZE: usize = 2048;

/// The order in which a fragment walks its operator list during one pass.
///
/// Planners differ in how they lay out a chain: some push operators in data
/// flow order, others build it from the sink side and push the operator
/// nearest the source last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorOrder {
    /// Index 0 runs first
    #[default]
    Forward,
    /// The last index runs first
    Reverse,
}

/// Settings for the execution core
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of worker threads in the scheduler pool
    pub worker_threads: usize,
    /// Rows per batch; scratch columns are pre-sized to this
    pub vector_size: usize,
    /// Fail a cast on the first row that cannot be converted instead of
    /// nulling that row
    pub strict_cast: bool,
    /// Default operator order for fragments built without an explicit one
    pub operator_order: OperatorOrder,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            vector_size: DEFAULT_VECTOR_SIZE,
            strict_cast: false,
            operator_order: OperatorOrder::Forward,
        }
    }
}

impl ExecutionConfig {
    /// Parse a config from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ExecutionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_strict_cast(mut self, strict_cast: bool) -> Self {
        self.strict_cast = strict_cast;
        self
    }

    /// Check that the settings can drive an executor
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".to_string()));
        }
        if self.vector_size == 0 {
            return Err(Error::Config("vector_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
