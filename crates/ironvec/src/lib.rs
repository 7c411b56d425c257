//! IronVec - Vectorized expression evaluation driven by parallel fragment tasks
//!
//! IronVec is the execution core of an analytical engine, providing:
//! - Column-at-a-time evaluation of bound expression trees
//! - Streaming aggregation with per-task accumulators
//! - Linear operator fragments run by a shared worker pool
//!
//! # Example
//!
//! ```rust
//! use ironvec::execution::operators::{ChunkSource, ProjectionOperator};
//! use ironvec::execution::{DataChunk, Expression, Operator};
//! use ironvec::{Engine, ExecutionConfig, LogicalType, Value};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(ExecutionConfig::default().with_worker_threads(2)).unwrap();
//!
//! let input = DataChunk::from_rows(
//!     &[vec![Value::Integer(1)], vec![Value::Integer(2)]],
//!     &[LogicalType::Integer],
//! )
//! .unwrap();
//! let projection: Arc<dyn Operator> = Arc::new(ProjectionOperator::new(vec![
//!     Expression::reference(0, LogicalType::Integer),
//! ]));
//!
//! let result = engine
//!     .query(Arc::new(ChunkSource::new(vec![input])), vec![projection], 1)
//!     .unwrap();
//! assert_eq!(result.row_count(), 2);
//! ```

pub use ironvec_common as common;
pub use ironvec_execution as execution;
pub use ironvec_scheduler as scheduler;

pub use ironvec_common::{Error, ExecutionConfig, LogicalType, OperatorOrder, Result, Value};

use ironvec_execution::operators::CollectSink;
use ironvec_execution::{DataChunk, Operator, QueryContext, Sink, Source};
use ironvec_scheduler::{Fragment, FragmentContext, Scheduler};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Owns the worker pool and runs fragments on it
pub struct Engine {
    config: ExecutionConfig,
    scheduler: Scheduler,
    next_query_id: AtomicU64,
}

impl Engine {
    /// Start an engine with `config.worker_threads` workers
    pub fn new(config: ExecutionConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = Scheduler::new(config.worker_threads)?;
        debug!(?config, "engine started");
        Ok(Engine {
            config,
            scheduler,
            next_query_id: AtomicU64::new(1),
        })
    }

    /// Start an engine from a JSON config document
    pub fn from_json_config(json: &str) -> Result<Self> {
        Self::new(ExecutionConfig::from_json_str(json)?)
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.scheduler.worker_count()
    }

    /// A fresh query context carrying this engine's config
    pub fn new_query(&self) -> Arc<QueryContext> {
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(QueryContext::new(query_id, self.config.clone()))
    }

    /// Run `fragment` with `parallelism` tasks and wait for it to finish
    pub fn execute_fragment(
        &self,
        query: &Arc<QueryContext>,
        fragment: Fragment,
        parallelism: usize,
    ) -> Result<()> {
        let context = FragmentContext::new(Arc::clone(query), fragment);
        let result = self.scheduler.execute(&context, parallelism);
        debug!(
            query_id = query.query_id(),
            passes = context.completed_passes(),
            rows = context.sink_state().rows_sunk(),
            cast_failures = query.cast_failures(),
            ok = result.is_ok(),
            "fragment done"
        );
        result
    }

    /// Run `source -> operators` and collect everything that reaches the sink.
    ///
    /// The operators are walked in the configured `operator_order`.
    pub fn query(
        &self,
        source: Arc<dyn Source>,
        operators: Vec<Arc<dyn Operator>>,
        parallelism: usize,
    ) -> Result<QueryResult> {
        let sink = Arc::new(CollectSink::new());
        let fragment = Fragment::new(source, operators, Arc::clone(&sink) as Arc<dyn Sink>)
            .with_order(self.config.operator_order);
        let query = self.new_query();
        self.execute_fragment(&query, fragment, parallelism)?;
        Ok(QueryResult {
            chunks: sink.take_chunks(),
            cast_failures: query.cast_failures(),
        })
    }
}

/// Batches collected from a query, in arrival order
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub chunks: Vec<DataChunk>,
    /// Rows a lenient cast could not convert and returned as NULL
    pub cast_failures: usize,
}

impl QueryResult {
    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.chunks.iter().map(|c| c.row_count()).sum()
    }

    /// Check if result is empty
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// All rows as values
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.chunks.iter().flat_map(|c| c.to_rows()).collect()
    }

    /// Every value of column `idx`
    pub fn column(&self, idx: usize) -> Vec<Value> {
        self.chunks
            .iter()
            .filter(|c| idx < c.column_count())
            .flat_map(|c| c.column(idx).to_values())
            .collect()
    }

    /// Get a single value (first row, first column)
    pub fn scalar(&self) -> Option<Value> {
        self.rows().into_iter().next().and_then(|row| row.into_iter().next())
    }
}
