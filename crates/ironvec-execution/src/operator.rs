//! Physical operator contracts
//!
//! Sources, operators and sinks are shared by every task of a fragment, so
//! they take `&self`; anything that changes from pass to pass lives in the
//! state objects owned by the calling task.

use crate::chunk::DataChunk;
use crate::expression_state::ExpressionState;
use crate::vector::ColumnRef;
use ironvec_common::{Error, ExecutionConfig, LogicalType, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Query-wide context shared by every fragment of one query
#[derive(Debug)]
pub struct QueryContext {
    query_id: u64,
    config: ExecutionConfig,
    cancelled: AtomicBool,
    cast_failures: AtomicUsize,
}

impl QueryContext {
    pub fn new(query_id: u64, config: ExecutionConfig) -> Self {
        QueryContext {
            query_id,
            config,
            cancelled: AtomicBool::new(false),
            cast_failures: AtomicUsize::new(0),
        }
    }

    pub fn query_id(&self) -> u64 {
        self.query_id
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Request cancellation; tasks stop at their next pass boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Add rows that a lenient cast turned into NULL
    pub fn record_cast_failures(&self, rows: usize) {
        if rows > 0 {
            self.cast_failures.fetch_add(rows, Ordering::Relaxed);
        }
    }

    /// Rows nulled by casts across every task of the query
    pub fn cast_failures(&self) -> usize {
        self.cast_failures.load(Ordering::Relaxed)
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a source produced in one pass
#[derive(Debug, Default)]
pub struct SourceState {
    /// Zero or one batch
    pub chunk: Option<DataChunk>,
    /// No further batches will be produced for this task
    pub exhausted: bool,
}

/// Input handed to an operator in one pass
#[derive(Debug, Default)]
pub struct OperatorInputState {
    pub chunk: Option<DataChunk>,
    /// Mirrors the source: this is the task's last pass
    pub source_exhausted: bool,
}

/// Per-task operator state, built once by `Operator::init_output_state`
#[derive(Debug, Default)]
pub struct OperatorOutputState {
    /// Batch produced by the most recent pass, if any
    pub chunk: Option<DataChunk>,
    /// One state tree per expression the operator evaluates
    pub expression_states: Vec<ExpressionState>,
    /// Destination columns, one per expression
    pub columns: Vec<ColumnRef>,
    /// Set once an operator has emitted everything it ever will
    pub finished: bool,
}

/// Shared sink-side state: the first error of the fragment and row counts
#[derive(Debug, Default)]
pub struct SinkState {
    error: Mutex<Option<Error>>,
    rows_sunk: AtomicUsize,
    chunks_sunk: AtomicUsize,
}

impl SinkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `error` unless one is already stored. Returns true if it was stored.
    pub fn set_error(&self, error: Error) -> bool {
        let mut slot = self.error.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(error);
        true
    }

    pub fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.lock().as_ref().map(|e| e.to_string())
    }

    pub fn has_error(&self) -> bool {
        self.error.lock().is_some()
    }

    pub fn record_sunk(&self, rows: usize) {
        self.rows_sunk.fetch_add(rows, Ordering::Relaxed);
        self.chunks_sunk.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows_sunk(&self) -> usize {
        self.rows_sunk.load(Ordering::Relaxed)
    }

    pub fn chunks_sunk(&self) -> usize {
        self.chunks_sunk.load(Ordering::Relaxed)
    }
}

/// A source operator that produces data
pub trait Source: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Produce at most one batch into `state`
    fn execute(&self, ctx: &QueryContext, state: &mut SourceState) -> Result<()>;
}

/// An operator that transforms data
pub trait Operator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Types of the columns this operator emits
    fn output_types(&self) -> Vec<LogicalType>;

    /// Build the per-task state; called once per task before its first pass
    fn init_output_state(&self, ctx: &QueryContext) -> OperatorOutputState;

    /// Execute on input, produce output. Leaving `output.chunk` empty means
    /// nothing flows downstream this pass.
    fn execute(
        &self,
        ctx: &QueryContext,
        input: &mut OperatorInputState,
        output: &mut OperatorOutputState,
    ) -> Result<()>;
}

/// A sink operator that consumes data
pub trait Sink: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Consume a batch of data
    fn execute(&self, ctx: &QueryContext, chunk: DataChunk, state: &SinkState) -> Result<()>;
}
