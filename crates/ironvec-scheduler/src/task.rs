//! Fragment tasks
//!
//! A task is one schedulable driver of a fragment. Each call to
//! [`FragmentTask::run`] performs a single pass: pull at most one batch from
//! the source, push it through the operator chain and hand the result to the
//! sink. Errors never escape `run`; they are stored on the fragment and the
//! task retires.

use crate::fragment::FragmentContext;
use ironvec_common::{Error, Result};
use ironvec_execution::{DataChunk, OperatorInputState, OperatorOutputState, SourceState};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Uninitialized,
    Initialized,
    Running,
    Completed,
}

/// What the scheduler should do with a task after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Run it again
    Pending,
    /// The source is exhausted and everything was sunk
    Completed,
    /// The task stopped early; the reason is stored on the fragment
    Failed,
}

#[derive(Debug)]
pub struct FragmentTask {
    task_id: usize,
    context: Arc<FragmentContext>,
    state: TaskState,
    source_state: SourceState,
    input_states: Vec<OperatorInputState>,
    output_states: Vec<OperatorOutputState>,
}

impl FragmentTask {
    pub(crate) fn new(task_id: usize, context: Arc<FragmentContext>) -> Self {
        FragmentTask {
            task_id,
            context,
            state: TaskState::Uninitialized,
            source_state: SourceState::default(),
            input_states: Vec::new(),
            output_states: Vec::new(),
        }
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Size the per-operator state to the chain and build each operator's state
    pub fn init(&mut self) {
        if self.state != TaskState::Uninitialized {
            return;
        }
        let fragment = self.context.fragment();
        let query = self.context.query();
        self.input_states = (0..fragment.operator_count())
            .map(|_| OperatorInputState::default())
            .collect();
        self.output_states = fragment
            .operators()
            .iter()
            .map(|op| op.init_output_state(query))
            .collect();
        self.state = TaskState::Initialized;
    }

    /// Batch emitted by operator `idx` in the most recent pass
    pub fn operator_output(&self, idx: usize) -> Option<&DataChunk> {
        self.output_states.get(idx).and_then(|s| s.chunk.as_ref())
    }

    /// Run one pass
    pub fn run(&mut self, worker_id: usize) -> TaskStatus {
        match self.state {
            TaskState::Completed => return TaskStatus::Completed,
            TaskState::Uninitialized => self.init(),
            TaskState::Initialized | TaskState::Running => {}
        }
        self.state = TaskState::Running;

        let context = Arc::clone(&self.context);
        trace!(
            query_id = context.query().query_id(),
            task_id = self.task_id,
            worker_id,
            "running fragment task"
        );

        if context.is_aborted() {
            return self.retire(&context, TaskStatus::Failed);
        }
        if context.query().is_cancelled() {
            context.record_error(Error::Cancelled);
            return self.retire(&context, TaskStatus::Failed);
        }

        let outcome = self
            .run_pass(&context)
            .and_then(|chunk| self.sink(&context, chunk));

        let status = match outcome {
            Ok(()) if self.source_state.exhausted => TaskStatus::Completed,
            Ok(()) => TaskStatus::Pending,
            Err(error) => {
                warn!(
                    query_id = context.query().query_id(),
                    task_id = self.task_id,
                    %error,
                    "fragment pass failed"
                );
                context.record_error(error);
                TaskStatus::Failed
            }
        };

        if status == TaskStatus::Pending {
            context.complete(false);
            status
        } else {
            self.retire(&context, status)
        }
    }

    fn retire(&mut self, context: &FragmentContext, status: TaskStatus) -> TaskStatus {
        self.state = TaskState::Completed;
        context.complete(true);
        status
    }

    /// Source then operators; returns the batch for the sink
    fn run_pass(&mut self, context: &FragmentContext) -> Result<Option<DataChunk>> {
        let query = context.query();
        let fragment = context.fragment();

        self.source_state.chunk = None;
        fragment.source().execute(query, &mut self.source_state)?;
        let exhausted = self.source_state.exhausted;
        let mut current = self.source_state.chunk.take();

        for idx in fragment.execution_order() {
            let operator = &fragment.operators()[idx];
            let input = &mut self.input_states[idx];
            input.chunk = current.take();
            input.source_exhausted = exhausted;

            let output = &mut self.output_states[idx];
            operator.execute(query, input, output).map_err(|error| {
                debug!(operator = operator.name(), idx, %error, "operator failed");
                error
            })?;
            current = output.chunk.clone();
        }
        Ok(current)
    }

    fn sink(&self, context: &FragmentContext, chunk: Option<DataChunk>) -> Result<()> {
        let sink_state = context.sink_state();
        match chunk {
            Some(chunk) if !chunk.is_empty() => {
                let rows = chunk.row_count();
                context
                    .fragment()
                    .sink()
                    .execute(context.query(), chunk, sink_state)?;
                sink_state.record_sunk(rows);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Drop for FragmentTask {
    fn drop(&mut self) {
        // A task that never retired still holds a slot in the fragment
        if self.state != TaskState::Completed {
            self.context.record_error(Error::Execution(format!(
                "fragment task {} was dropped before it completed",
                self.task_id
            )));
            self.state = TaskState::Completed;
            self.context.complete(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use ironvec_common::{ExecutionConfig, LogicalType, OperatorOrder, Value};
    use ironvec_execution::operators::{ChunkSource, CollectSink, ProjectionOperator};
    use ironvec_execution::{Expression, Operator, QueryContext};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Passes its input through and counts calls; fails on call `fail_on`
    #[derive(Debug)]
    struct CountingOperator {
        calls: AtomicUsize,
        fail_on: Option<usize>,
        error: Error,
    }

    impl CountingOperator {
        fn passthrough() -> Arc<Self> {
            Arc::new(CountingOperator {
                calls: AtomicUsize::new(0),
                fail_on: None,
                error: Error::Internal(String::new()),
            })
        }

        fn failing(fail_on: usize, error: Error) -> Arc<Self> {
            Arc::new(CountingOperator {
                calls: AtomicUsize::new(0),
                fail_on: Some(fail_on),
                error,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Operator for CountingOperator {
        fn name(&self) -> &str {
            "COUNTING"
        }

        fn output_types(&self) -> Vec<LogicalType> {
            vec![LogicalType::Integer]
        }

        fn init_output_state(&self, _ctx: &QueryContext) -> OperatorOutputState {
            OperatorOutputState::default()
        }

        fn execute(
            &self,
            _ctx: &QueryContext,
            input: &mut OperatorInputState,
            output: &mut OperatorOutputState,
        ) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(call) {
                return Err(self.error.clone());
            }
            output.chunk = input.chunk.take();
            Ok(())
        }
    }

    fn chain(operators: &[&Arc<CountingOperator>]) -> Vec<Arc<dyn Operator>> {
        operators
            .iter()
            .map(|counter| Arc::clone(*counter) as Arc<dyn Operator>)
            .collect()
    }

    fn int_chunks(batches: &[&[i32]]) -> Vec<DataChunk> {
        batches
            .iter()
            .map(|batch| {
                let rows: Vec<Vec<Value>> = batch.iter().map(|&v| vec![Value::Integer(v)]).collect();
                DataChunk::from_rows(&rows, &[LogicalType::Integer]).unwrap()
            })
            .collect()
    }

    fn build(
        chunks: Vec<DataChunk>,
        operators: Vec<Arc<dyn Operator>>,
        order: OperatorOrder,
    ) -> (Arc<FragmentContext>, Arc<CollectSink>) {
        let sink = Arc::new(CollectSink::new());
        let fragment = Fragment::new(
            Arc::new(ChunkSource::new(chunks)),
            operators,
            Arc::clone(&sink) as Arc<dyn ironvec_execution::Sink>,
        )
        .with_order(order);
        let query = Arc::new(QueryContext::new(1, ExecutionConfig::default()));
        (FragmentContext::new(query, fragment), sink)
    }

    fn drive(task: &mut FragmentTask) -> TaskStatus {
        loop {
            match task.run(0) {
                TaskStatus::Pending => continue,
                status => return status,
            }
        }
    }

    #[test]
    fn test_runs_until_exhausted() {
        let (ctx, sink) = build(
            int_chunks(&[&[1, 2], &[3]]),
            chain(&[&CountingOperator::passthrough()]),
            OperatorOrder::Forward,
        );
        let mut task = ctx.create_tasks(1).pop().unwrap();
        assert_eq!(task.state(), TaskState::Uninitialized);
        task.init();
        assert_eq!(task.state(), TaskState::Initialized);

        assert_eq!(task.run(0), TaskStatus::Pending);
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.run(0), TaskStatus::Completed);
        assert_eq!(task.state(), TaskState::Completed);

        assert!(ctx.is_finished());
        assert_eq!(ctx.completed_passes(), 2);
        assert_eq!(ctx.sink_state().rows_sunk(), 3);
        assert_eq!(sink.row_count(), 3);
    }

    #[test]
    fn test_failing_operator_skips_sink() {
        let first = CountingOperator::passthrough();
        let failing = CountingOperator::failing(0, Error::DivisionByZero);
        let last = CountingOperator::passthrough();
        let (ctx, sink) = build(
            int_chunks(&[&[1], &[2]]),
            chain(&[&first, &failing, &last]),
            OperatorOrder::Forward,
        );
        let mut task = ctx.create_tasks(1).pop().unwrap();

        assert_eq!(task.run(0), TaskStatus::Failed);
        assert_eq!(first.calls(), 1);
        assert_eq!(failing.calls(), 1);
        assert_eq!(last.calls(), 0);

        assert_eq!(sink.row_count(), 0);
        assert_eq!(ctx.result(), Err(Error::DivisionByZero));
        assert_eq!(ctx.completed_passes(), 1);
        assert!(ctx.is_finished());

        // Retired tasks do not run again
        assert_eq!(task.run(0), TaskStatus::Completed);
        assert_eq!(ctx.completed_passes(), 1);
    }

    #[test]
    fn test_reverse_order_runs_last_operator_first() {
        let first = CountingOperator::failing(0, Error::Execution("index 0".to_string()));
        let last = CountingOperator::failing(0, Error::Execution("index 1".to_string()));
        let (ctx, _sink) = build(
            int_chunks(&[&[1]]),
            chain(&[&first, &last]),
            OperatorOrder::Reverse,
        );
        let mut task = ctx.create_tasks(1).pop().unwrap();

        assert_eq!(task.run(0), TaskStatus::Failed);
        assert_eq!(last.calls(), 1);
        assert_eq!(first.calls(), 0);
        assert_eq!(ctx.result(), Err(Error::Execution("index 1".to_string())));
    }

    #[test]
    fn test_orders_agree_on_mirrored_chains() {
        let add_one = |column| {
            Arc::new(ProjectionOperator::new(vec![Expression::function(
                ironvec_execution::function::scalar::add(&LogicalType::Integer).unwrap(),
                vec![Expression::reference(column, LogicalType::Integer), Expression::value(1)],
            )])) as Arc<dyn Operator>
        };
        let double = || {
            Arc::new(ProjectionOperator::new(vec![Expression::function(
                ironvec_execution::function::scalar::multiply(&LogicalType::Integer).unwrap(),
                vec![Expression::reference(0, LogicalType::Integer), Expression::value(2)],
            )])) as Arc<dyn Operator>
        };

        let (forward, forward_sink) = build(
            int_chunks(&[&[1, 2]]),
            vec![add_one(0), double()],
            OperatorOrder::Forward,
        );
        let (reverse, reverse_sink) = build(
            int_chunks(&[&[1, 2]]),
            vec![double(), add_one(0)],
            OperatorOrder::Reverse,
        );
        for ctx in [&forward, &reverse] {
            let mut task = ctx.create_tasks(1).pop().unwrap();
            assert_eq!(drive(&mut task), TaskStatus::Completed);
        }

        let expected = vec![vec![Value::Integer(4)], vec![Value::Integer(6)]];
        assert_eq!(forward_sink.rows(), expected);
        assert_eq!(reverse_sink.rows(), expected);
    }

    #[test]
    fn test_operator_output_visible_after_pass() {
        let (ctx, _sink) = build(
            int_chunks(&[&[7, 8]]),
            chain(&[&CountingOperator::passthrough()]),
            OperatorOrder::Forward,
        );
        let mut task = ctx.create_tasks(1).pop().unwrap();
        task.run(0);
        assert_eq!(task.operator_output(0).map(|c| c.row_count()), Some(2));
        assert!(task.operator_output(1).is_none());
    }

    #[test]
    fn test_cancelled_before_pass() {
        let counter = CountingOperator::passthrough();
        let (ctx, sink) = build(int_chunks(&[&[1]]), chain(&[&counter]), OperatorOrder::Forward);
        let mut task = ctx.create_tasks(1).pop().unwrap();

        ctx.query().cancel();
        assert_eq!(task.run(0), TaskStatus::Failed);
        assert_eq!(counter.calls(), 0);
        assert_eq!(sink.row_count(), 0);
        assert_eq!(ctx.result(), Err(Error::Cancelled));
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_unrecoverable_error_stops_siblings() {
        let counter = CountingOperator::failing(0, Error::InvalidColumnIndex {
            index: 3,
            column_count: 1,
        });
        let (ctx, _sink) = build(
            int_chunks(&[&[1], &[2], &[3]]),
            chain(&[&counter]),
            OperatorOrder::Forward,
        );
        let mut tasks = ctx.create_tasks(2);

        assert_eq!(tasks[0].run(0), TaskStatus::Failed);
        assert!(ctx.is_aborted());
        assert_eq!(tasks[1].run(1), TaskStatus::Failed);
        assert_eq!(counter.calls(), 1);
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_recoverable_error_lets_siblings_keep_sinking() {
        let counter = CountingOperator::failing(0, Error::DivisionByZero);
        let (ctx, sink) = build(
            int_chunks(&[&[1], &[2], &[3]]),
            chain(&[&counter]),
            OperatorOrder::Forward,
        );
        let mut tasks = ctx.create_tasks(2);

        assert_eq!(tasks[0].run(0), TaskStatus::Failed);
        assert!(!ctx.is_aborted());
        assert_eq!(drive(&mut tasks[1]), TaskStatus::Completed);

        // The failed batch is lost; clean passes of the sibling still sink
        assert_eq!(sink.rows(), vec![vec![Value::Integer(2)], vec![Value::Integer(3)]]);
        assert_eq!(ctx.sink_state().rows_sunk(), 2);
        assert_eq!(ctx.result(), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_dropped_task_reports_failure() {
        let (ctx, _sink) = build(int_chunks(&[&[1]]), vec![], OperatorOrder::Forward);
        let tasks = ctx.create_tasks(1);
        drop(tasks);
        assert!(ctx.is_finished());
        assert!(matches!(ctx.result(), Err(Error::Execution(_))));
    }
}
