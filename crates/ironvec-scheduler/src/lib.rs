//! IronVec Scheduler - Parallel execution of fragments
//!
//! A fragment is a linear operator chain. It is run by one or more
//! `FragmentTask`s, each a repeatable unit of work that a `Scheduler` worker
//! invokes until the fragment's source is exhausted or the fragment fails.

pub mod fragment;
pub mod scheduler;
pub mod task;

pub use fragment::{Fragment, FragmentContext};
pub use scheduler::Scheduler;
pub use task::{FragmentTask, TaskState, TaskStatus};
