// Background retraining worker
// A single thread runs retrain jobs; requests arriving while one is queued
// are merged into it, so a burst of triggers costs at most one extra run.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Work executed by the worker thread
pub type RetrainJob = Box<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct QueueState {
    pending: bool,
    running: bool,
    shutdown: bool,
}

struct WorkerShared {
    state: Mutex<QueueState>,
    condvar: Condvar,
    submitted: AtomicU64,
    coalesced: AtomicU64,
    completed: AtomicU64,
}

/// Coalescing single-slot job queue with one worker thread
pub struct RetrainWorker {
    shared: Arc<WorkerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetrainWorker {
    pub fn new(job: RetrainJob) -> std::io::Result<Self> {
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(QueueState::default()),
            condvar: Condvar::new(),
            submitted: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("retrain-worker".to_string())
            .spawn(move || run(worker_shared, job))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a run. Returns `false` when one was already waiting and this
    /// request was merged into it.
    pub fn submit(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return false;
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if state.pending {
            self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.pending = true;
        self.shared.condvar.notify_all();
        true
    }

    pub fn is_busy(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending || state.running
    }

    /// Block until nothing is queued or running, or `timeout` elapses.
    /// Returns whether the worker went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.pending || state.running {
            if self
                .shared
                .condvar
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return !(state.pending || state.running);
            }
        }
        true
    }

    pub fn jobs_submitted(&self) -> u64 {
        self.shared.submitted.load(Ordering::Relaxed)
    }

    pub fn jobs_coalesced(&self) -> u64 {
        self.shared.coalesced.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Stop accepting work and wait for the thread; a queued run still executes
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.condvar.notify_all();
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("Retrain worker panicked");
            }
        }
    }
}

impl Drop for RetrainWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<WorkerShared>, job: RetrainJob) {
    loop {
        {
            let mut state = shared.state.lock();
            while !state.pending && !state.shutdown {
                shared.condvar.wait(&mut state);
            }
            if !state.pending {
                break;
            }
            state.pending = false;
            state.running = true;
        }

        debug!("Retrain job started");
        job();

        shared.completed.fetch_add(1, Ordering::Relaxed);
        let mut state = shared.state.lock();
        state.running = false;
        shared.condvar.notify_all();
    }
    debug!("Retrain worker stopped");
}
