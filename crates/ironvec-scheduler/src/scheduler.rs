//! Worker pool that drives fragment tasks
//!
//! Tasks travel over a crossbeam channel. A worker runs one pass of the task
//! it receives and puts it back on the channel while it is still pending, so
//! tasks of many fragments interleave on a fixed set of threads.

use crate::fragment::FragmentContext;
use crate::task::{FragmentTask, TaskStatus};
use crossbeam::channel::{self, Receiver, Sender};
use ironvec_common::{Error, Result};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

enum Message {
    Run(FragmentTask),
    Shutdown,
}

/// Fixed-size pool of worker threads
pub struct Scheduler {
    sender: Sender<Message>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(worker_threads: usize) -> Result<Self> {
        if worker_threads == 0 {
            return Err(Error::Config(
                "scheduler needs at least one worker thread".to_string(),
            ));
        }

        let (sender, receiver) = channel::unbounded::<Message>();
        let mut workers = Vec::with_capacity(worker_threads);
        for worker_id in 0..worker_threads {
            let receiver = receiver.clone();
            let requeue = sender.clone();
            let handle = thread::Builder::new()
                .name(format!("ironvec-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, receiver, requeue))
                .map_err(|e| Error::Internal(format!("failed to spawn worker thread: {}", e)))?;
            workers.push(handle);
        }
        debug!(worker_threads, "scheduler started");

        Ok(Scheduler { sender, workers })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task; it is run until it retires
    pub fn schedule(&self, task: FragmentTask) -> Result<()> {
        self.sender
            .send(Message::Run(task))
            .map_err(|_| Error::Internal("scheduler is shut down".to_string()))
    }

    /// Run `context` with `parallelism` tasks and wait for it to finish
    pub fn execute(&self, context: &Arc<FragmentContext>, parallelism: usize) -> Result<()> {
        for mut task in context.create_tasks(parallelism) {
            task.init();
            self.schedule(task)?;
        }
        context.wait();
        context.result()
    }
}

fn worker_loop(worker_id: usize, receiver: Receiver<Message>, requeue: Sender<Message>) {
    trace!(worker_id, "worker started");
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(mut task) => {
                if task.run(worker_id) == TaskStatus::Pending
                    && requeue.send(Message::Run(task)).is_err()
                {
                    break;
                }
            }
            Message::Shutdown => break,
        }
    }
    trace!(worker_id, "worker stopped");
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }
        for worker in self.workers.drain(..) {
            // A worker that panicked has nothing left to clean up
            let _ = worker.join();
        }
        debug!("scheduler stopped");
    }
}
