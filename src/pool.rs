//! Bounded FIFO worker pool.
//!
//! A fixed set of worker threads drains a queue of unit-of-work closures.
//! One mutex protects the queue, the counters, and the shutdown flag; two
//! condition variables signal work arriving and work draining.  Workers
//! never hold the mutex while running a job.
use crate::log::{info, tag};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub enum SubmitError {
    /// The pool is shutting down.
    ShuttingDown,
    /// The queue is at its configured maximum.  The rejection is counted.
    QueueFull,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub queued: usize,
    pub busy: usize,
    pub completed: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    shutdown: bool,
    busy: usize,
    completed: u64,
    rejected: u64,
}

struct Shared {
    state: Mutex<State>,
    work_available: Condvar,
    drained: Condvar,
    max_queue: usize,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}
impl WorkerPool {
    /// Starts `workers` threads with a queue bounded at `max_queue` items.
    /// A `max_queue` of zero leaves the queue unbounded.
    ///
    /// # Panics
    /// Panics when `workers` is zero.
    #[must_use]
    pub fn new(workers: usize, max_queue: usize) -> Self {
        assert!(workers > 0, "refusing to start a pool with zero workers");
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            work_available: Condvar::new(),
            drained: Condvar::new(),
            max_queue,
        });
        let handles = (0..workers)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(&shared))
            })
            .collect();
        Self {
            shared,
            workers: handles,
        }
    }

    /// Queues a closure for execution in FIFO order.
    ///
    /// # Errors
    /// Fails when the pool is shutting down, or when the queue is full
    /// (counted as a rejection).
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), SubmitError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.shutdown {
            return Err(SubmitError::ShuttingDown);
        }
        if self.shared.max_queue > 0 && state.queue.len() >= self.shared.max_queue {
            state.rejected += 1;
            return Err(SubmitError::QueueFull);
        }
        state.queue.push_back(Box::new(job));
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Blocks until the queue is empty and no worker is busy.  Does not
    /// stop the workers.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.queue.is_empty() || state.busy > 0 {
            state = self.shared.drained.wait(state).unwrap();
        }
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().unwrap();
        PoolStats {
            queued: state.queue.len(),
            busy: state.busy,
            completed: state.completed,
            rejected: state.rejected,
        }
    }

    /// Sets the shutdown flag, wakes every worker, joins them, drops any
    /// residual queued work, and logs the counters.  Workers finish the
    /// queue before exiting.
    pub fn shutdown(mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            self.shared.work_available.notify_all();
            self.shared.drained.notify_all();
        }
        for handle in self.workers.drain(..) {
            let _ignored = handle.join();
        }
        let mut state = self.shared.state.lock().unwrap();
        state.queue.clear();
        info(
            "worker pool destroyed",
            vec![
                tag("completed", state.completed),
                tag("rejected", state.rejected),
            ],
        );
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.busy += 1;
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = shared.work_available.wait(state).unwrap();
            }
        };
        job();
        let mut state = shared.state.lock().unwrap();
        state.busy -= 1;
        state.completed += 1;
        shared.drained.notify_all();
    }
}
