//! Fixed-size detection worker pool.
//!
//! Each worker owns one task slot. `submit` places a task into a free slot
//! or fails immediately; there is no queue behind the slots, so memory and
//! latency stay bounded under overload and the caller drops the work.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use nvr_models::DetectionTask;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Executes the tasks taken from the pool.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: DetectionTask) -> WorkerResult<()>;
}

/// Pool counters, read under the pool lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    /// Workers currently executing a task
    pub active: usize,
    /// Tasks sitting in a slot, not yet picked up
    pub pending: usize,
    pub completed: u64,
    /// Tasks whose handler returned an error or panicked
    pub failed: u64,
    /// Submissions refused because every slot was taken
    pub rejected: u64,
}

#[derive(Default)]
struct Slot {
    task: Option<DetectionTask>,
    busy: bool,
}

struct PoolState {
    slots: Vec<Slot>,
    running: bool,
    active: usize,
    pending: usize,
    completed: u64,
    failed: u64,
    rejected: u64,
}

impl PoolState {
    fn free_slot(&self) -> Option<usize> {
        // Prefer a slot whose worker can start right away.
        self.slots
            .iter()
            .position(|s| s.task.is_none() && !s.busy)
            .or_else(|| self.slots.iter().position(|s| s.task.is_none()))
    }
}

struct Shared {
    state: Mutex<PoolState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Handlers never run under this lock, so a poisoned guard still
        // holds consistent counters.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Bounded pool of OS threads executing [`DetectionTask`]s.
pub struct DetectionWorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl DetectionWorkerPool {
    /// Spawn `size` workers running `handler`.
    pub fn new(size: usize, handler: Arc<dyn TaskHandler>) -> WorkerResult<Self> {
        if size == 0 {
            return Err(WorkerError::config_error("worker pool needs at least one thread"));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                slots: (0..size).map(|_| Slot::default()).collect(),
                running: true,
                active: 0,
                pending: 0,
                completed: 0,
                failed: 0,
                rejected: 0,
            }),
            wake: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let shared = Arc::clone(&shared);
            let handler = Arc::clone(&handler);
            let handle = std::thread::Builder::new()
                .name(format!("detect-worker-{}", index))
                .spawn(move || worker_loop(index, shared, handler))?;
            handles.push(handle);
        }

        info!(workers = size, "Detection worker pool started");

        Ok(Self {
            shared,
            handles: Mutex::new(handles),
            size,
        })
    }

    /// Hand `task` to a free slot. Returns `false` when the pool is
    /// saturated or shut down; the task is dropped.
    pub fn submit(&self, task: DetectionTask) -> bool {
        let kind = task.kind();
        let mut state = self.shared.lock();

        if !state.running {
            debug!(stream = %task.stream(), "Task submitted to stopped pool");
            return false;
        }

        let Some(index) = state.free_slot() else {
            state.rejected += 1;
            drop(state);
            metrics::record_pool_submission(kind, false);
            debug!(stream = %task.stream(), kind, "Worker pool saturated, task dropped");
            return false;
        };

        state.slots[index].task = Some(task);
        state.pending += 1;
        drop(state);

        // Workers wait on their own slot, so wake them all.
        self.shared.wake.notify_all();
        metrics::record_pool_submission(kind, true);
        true
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            workers: self.size,
            active: state.active,
            pending: state.pending,
            completed: state.completed,
            failed: state.failed,
            rejected: state.rejected,
        }
    }

    /// Whether every slot is taken.
    pub fn is_busy(&self) -> bool {
        self.shared.lock().free_slot().is_none()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// Tasks still waiting in a slot are dropped after the join. Calling
    /// this again is a no-op.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            if !state.running {
                return;
            }
            state.running = false;
        }
        self.shared.wake.notify_all();

        let handles = {
            let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("Detection worker thread panicked outside task execution");
            }
        }

        let mut state = self.shared.lock();
        let dropped: usize = state
            .slots
            .iter_mut()
            .filter_map(|slot| slot.task.take())
            .count();
        state.pending = 0;
        drop(state);

        info!(dropped_tasks = dropped, "Detection worker pool stopped");
    }
}

impl Drop for DetectionWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, shared: Arc<Shared>, handler: Arc<dyn TaskHandler>) {
    loop {
        let task = {
            let mut state = shared.lock();
            loop {
                if !state.running {
                    return;
                }
                if let Some(task) = state.slots[index].task.take() {
                    state.slots[index].busy = true;
                    state.pending -= 1;
                    state.active += 1;
                    metrics::set_pool_active_workers(state.active);
                    break task;
                }
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(|p| p.into_inner());
            }
        };

        let stream = task.stream().to_string();
        let kind = task.kind();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(task)));

        let success = match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) if e.is_retryable() => {
                warn!(stream = %stream, kind, worker = index, error = %e, "Detection task failed");
                false
            }
            Ok(Err(e)) => {
                error!(stream = %stream, kind, worker = index, error = %e, "Detection task cannot succeed");
                false
            }
            Err(_) => {
                error!(stream = %stream, kind, worker = index, "Detection task panicked");
                false
            }
        };
        metrics::record_pool_task_done(kind, success);

        let mut state = shared.lock();
        state.slots[index].busy = false;
        state.active -= 1;
        if success {
            state.completed += 1;
        } else {
            state.failed += 1;
        }
        metrics::set_pool_active_workers(state.active);
    }
}
