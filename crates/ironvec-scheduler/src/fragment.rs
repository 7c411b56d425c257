//! Fragments and the context their tasks share
//!
//! A fragment is a linear chain `source -> operators -> sink`. The
//! `FragmentContext` wraps one fragment for the duration of a query and
//! tracks its outcome: the first stored error and how many tasks are still
//! running.

use crate::task::FragmentTask;
use ironvec_common::{Error, OperatorOrder, Result};
use ironvec_execution::{Operator, QueryContext, Sink, SinkState, Source};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A physical operator chain between one source and one sink
pub struct Fragment {
    source: Arc<dyn Source>,
    operators: Vec<Arc<dyn Operator>>,
    sink: Arc<dyn Sink>,
    order: OperatorOrder,
}

impl Fragment {
    pub fn new(
        source: Arc<dyn Source>,
        operators: Vec<Arc<dyn Operator>>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Fragment {
            source,
            operators,
            sink,
            order: OperatorOrder::default(),
        }
    }

    /// Set the order in which `operators` are walked during a pass
    pub fn with_order(mut self, order: OperatorOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> OperatorOrder {
        self.order
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn operators(&self) -> &[Arc<dyn Operator>] {
        &self.operators
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// Operator indices in the order a pass runs them
    pub fn execution_order(&self) -> Vec<usize> {
        let n = self.operators.len();
        match self.order {
            OperatorOrder::Forward => (0..n).collect(),
            OperatorOrder::Reverse => (0..n).rev().collect(),
        }
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operators: Vec<&str> = self.operators.iter().map(|op| op.name()).collect();
        f.debug_struct("Fragment")
            .field("source", &self.source.name())
            .field("operators", &operators)
            .field("sink", &self.sink.name())
            .field("order", &self.order)
            .finish()
    }
}

/// State shared by every task of one fragment
#[derive(Debug)]
pub struct FragmentContext {
    query: Arc<QueryContext>,
    fragment: Fragment,
    sink_state: SinkState,
    active_tasks: AtomicUsize,
    completed_passes: AtomicUsize,
    aborted: AtomicBool,
    finished: Mutex<bool>,
    finished_signal: Condvar,
}

impl FragmentContext {
    pub fn new(query: Arc<QueryContext>, fragment: Fragment) -> Arc<Self> {
        Arc::new(FragmentContext {
            query,
            fragment,
            sink_state: SinkState::new(),
            active_tasks: AtomicUsize::new(0),
            completed_passes: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            finished: Mutex::new(false),
            finished_signal: Condvar::new(),
        })
    }

    pub fn query(&self) -> &QueryContext {
        &self.query
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn sink_state(&self) -> &SinkState {
        &self.sink_state
    }

    /// Create `parallelism` tasks (at least one) that drive this fragment
    pub fn create_tasks(self: &Arc<Self>, parallelism: usize) -> Vec<FragmentTask> {
        let parallelism = parallelism.max(1);
        self.active_tasks.fetch_add(parallelism, Ordering::SeqCst);
        debug!(
            query_id = self.query.query_id(),
            parallelism,
            fragment = ?self.fragment,
            "created fragment tasks"
        );
        (0..parallelism)
            .map(|task_id| FragmentTask::new(task_id, Arc::clone(self)))
            .collect()
    }

    /// Report one finished pass. A retiring task also gives up its slot;
    /// the last one to do so finishes the fragment.
    pub fn complete(&self, retire: bool) {
        self.completed_passes.fetch_add(1, Ordering::SeqCst);
        if !retire {
            return;
        }
        if self.active_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            let mut finished = self.finished.lock();
            *finished = true;
            self.finished_signal.notify_all();
            debug!(query_id = self.query.query_id(), "fragment finished");
        }
    }

    /// Store `error` as the fragment's error if none is stored yet. An
    /// unrecoverable error also aborts the fragment.
    pub fn record_error(&self, error: Error) -> bool {
        if !error.is_recoverable() {
            warn!(query_id = self.query.query_id(), %error, "aborting fragment");
            self.aborted.store(true, Ordering::SeqCst);
        }
        self.sink_state.set_error(error)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Passes reported by all tasks so far
    pub fn completed_passes(&self) -> usize {
        self.completed_passes.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Block until every task has retired
    pub fn wait(&self) {
        let mut finished = self.finished.lock();
        while !*finished {
            self.finished_signal.wait(&mut finished);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns true
    /// if the fragment finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut finished = self.finished.lock();
        if !*finished {
            self.finished_signal
                .wait_while_for(&mut finished, |finished| !*finished, timeout);
        }
        *finished
    }

    /// The fragment's outcome: the first stored error, if any
    pub fn result(&self) -> Result<()> {
        match self.sink_state.error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
