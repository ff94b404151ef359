//! Cooperative task scheduler.
//!
//! Tasks are resumable closures registered under string keys and pumped
//! once per engine tick by [`Scheduler::update`] on the engine thread.
//! Each resume returns a [`Step`]: yield until the next tick, sleep for a
//! duration, or finish. Parallel tasks instead run to completion on a
//! rayon pool and are reaped when their completion channel fires.
//!
//! Start/stop requests from any thread (including from inside a running
//! task body) land in a pending-op log guarded by one mutex and take
//! effect at the start of the next tick, so a task stopping itself or
//! starting a sibling never disturbs the tick that is pumping it. Errors
//! and panics from task bodies are collected across the whole tick and
//! surfaced as one [`AggregateError`] at its end.

use crate::clock::{Clock, MonotonicClock};
use crossbeam_channel::{bounded, Receiver};
use keel_core::math::{decrement, next_prime};
use keel_core::{HashMap, SList};
use parking_lot::Mutex;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// What a task reports from one resume.
pub enum Step {
    /// Run again at the next tick.
    Yield,
    /// Do not resume before this much time has passed.
    Sleep(Duration),
    /// The task is finished and can be discarded.
    Done,
}

pub type TaskKey = String;
pub type TaskResult = std::result::Result<Step, Box<dyn std::error::Error + Send + Sync>>;
type TaskBody = Box<dyn FnMut() -> TaskResult + Send + 'static>;

/// One task's failure within a tick.
#[derive(Debug, Clone, Error)]
#[error("task {key:?} failed: {message}")]
pub struct TaskError {
    pub key: TaskKey,
    pub message: String,
}

/// Every failure collected during a single tick.
#[derive(Debug, Error)]
#[error("{} task(s) failed during update", .0.len())]
pub struct AggregateError(pub Vec<TaskError>);

enum PendingOp {
    Add {
        key: TaskKey,
        body: TaskBody,
        parallel: bool,
    },
    Remove {
        key: TaskKey,
    },
    RemoveAll,
}

struct Pending {
    ops: SList<PendingOp>,
    /// Net count of queued adds, used to presize the task maps.
    additions: usize,
    errors: Vec<TaskError>,
}

struct Shared {
    pending: Mutex<Pending>,
    ids: AtomicU64,
}

impl Shared {
    fn push_error(&self, error: TaskError) {
        self.pending.lock().errors.push(error);
    }
}

/// Clonable, thread-safe front door to a [`Scheduler`]. Task bodies hold
/// one of these to start or stop tasks from inside a tick.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Starts a blocking task under a generated key, which is returned.
    pub fn start(&self, body: impl FnMut() -> TaskResult + Send + 'static) -> TaskKey {
        let key = self.next_key();
        self.start_keyed(key.clone(), body, false);
        key
    }

    /// Starts a parallel task under a generated key, which is returned.
    pub fn start_parallel(&self, body: impl FnMut() -> TaskResult + Send + 'static) -> TaskKey {
        let key = self.next_key();
        self.start_keyed(key.clone(), body, true);
        key
    }

    /// Enqueues a task under `key`, effective at the next tick. A key
    /// already in use leaves the existing task in place.
    pub fn start_keyed(
        &self,
        key: impl Into<TaskKey>,
        body: impl FnMut() -> TaskResult + Send + 'static,
        parallel: bool,
    ) {
        let mut pending = self.shared.pending.lock();
        pending.ops.push_back(PendingOp::Add {
            key: key.into(),
            body: Box::new(body),
            parallel,
        });
        pending.additions += 1;
    }

    /// Requests removal of `key`, effective at the next tick. A running
    /// parallel task is not preempted; it is reaped once it completes.
    pub fn stop(&self, key: impl Into<TaskKey>) {
        let mut pending = self.shared.pending.lock();
        pending.ops.push_back(PendingOp::Remove { key: key.into() });
        decrement(&mut pending.additions);
    }

    /// Drops every queued op and requests removal of all tasks.
    pub fn stop_all(&self) {
        let mut pending = self.shared.pending.lock();
        pending.ops.clear();
        pending.ops.push_back(PendingOp::RemoveAll);
        pending.additions = 0;
    }

    fn next_key(&self) -> TaskKey {
        self.shared.ids.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

struct BlockingTask {
    body: TaskBody,
    next_resume: Instant,
    done: bool,
}

impl BlockingTask {
    /// Resumes once if the wake time has arrived. Returns whether the task
    /// is still alive.
    fn resume(&mut self, key: &str, now: Instant, errors: &mut Vec<TaskError>) -> bool {
        if !self.done && self.next_resume <= now {
            match catch_unwind(AssertUnwindSafe(|| (self.body)())) {
                Ok(Ok(Step::Yield)) => self.next_resume = now,
                Ok(Ok(Step::Sleep(delay))) => self.next_resume = now + delay,
                Ok(Ok(Step::Done)) => self.done = true,
                Ok(Err(error)) => {
                    errors.push(TaskError {
                        key: key.to_string(),
                        message: error.to_string(),
                    });
                    self.done = true;
                }
                Err(panic) => {
                    errors.push(TaskError {
                        key: key.to_string(),
                        message: panic_message(&panic),
                    });
                    self.done = true;
                }
            }
        }
        !self.done
    }
}

struct ParallelTask {
    completion: Receiver<()>,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// The engine's task registry and pump. `update()` runs on the engine
/// thread; everything reachable through [`SchedulerHandle`] may be called
/// from anywhere.
pub struct Scheduler {
    shared: Arc<Shared>,
    blocking: HashMap<TaskKey, BlockingTask>,
    parallel: HashMap<TaskKey, ParallelTask>,
    pool: rayon::ThreadPool,
    clock: Box<dyn Clock>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Scheduler {
            shared: Arc::new(Shared {
                pending: Mutex::new(Pending {
                    ops: SList::new(),
                    additions: 0,
                    errors: Vec::new(),
                }),
                ids: AtomicU64::new(0),
            }),
            blocking: HashMap::new(),
            parallel: HashMap::new(),
            pool: rayon::ThreadPoolBuilder::new()
                .build()
                .expect("failed to build task pool"),
            clock: Box::new(clock),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn start(&self, body: impl FnMut() -> TaskResult + Send + 'static) -> TaskKey {
        self.handle().start(body)
    }

    pub fn start_parallel(&self, body: impl FnMut() -> TaskResult + Send + 'static) -> TaskKey {
        self.handle().start_parallel(body)
    }

    pub fn start_keyed(
        &self,
        key: impl Into<TaskKey>,
        body: impl FnMut() -> TaskResult + Send + 'static,
        parallel: bool,
    ) {
        self.handle().start_keyed(key, body, parallel);
    }

    pub fn stop(&self, key: impl Into<TaskKey>) {
        self.handle().stop(key);
    }

    pub fn stop_all(&self) {
        self.handle().stop_all();
    }

    /// Live tasks plus queued additions.
    pub fn len(&self) -> usize {
        self.blocking.len() + self.parallel.len() + self.shared.pending.lock().additions
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One engine tick: apply pending ops, pump blocking tasks, reap
    /// finished parallel tasks, then surface everything that failed.
    pub fn update(&mut self) -> std::result::Result<(), AggregateError> {
        self.apply_pending();

        let handle = self.handle();
        let now = self.clock.now();
        let mut tick_errors = Vec::new();

        for (key, task) in self.blocking.iter_mut() {
            if !task.resume(key, now, &mut tick_errors) {
                handle.stop(key.clone());
            }
        }

        for (key, task) in self.parallel.iter() {
            if task.completion.try_recv().is_ok() {
                handle.stop(key.clone());
            }
        }

        let mut pending = self.shared.pending.lock();
        pending.errors.extend(tick_errors);
        if pending.errors.is_empty() {
            Ok(())
        } else {
            Err(AggregateError(mem::take(&mut pending.errors)))
        }
    }

    /// Step one of a tick. Presizes both maps for the net additions, then
    /// drains the op log in order.
    fn apply_pending(&mut self) {
        let ops = {
            let mut pending = self.shared.pending.lock();
            let additions = pending.additions;
            if self.blocking.bucket_count() < self.blocking.len() + additions {
                self.blocking
                    .resize(next_prime(self.blocking.len() + additions));
            }
            if self.parallel.bucket_count() < self.parallel.len() + additions {
                self.parallel
                    .resize(next_prime(self.parallel.len() + additions));
            }
            pending.additions = 0;
            mem::take(&mut pending.ops)
        };

        for op in ops {
            match op {
                PendingOp::Add {
                    key,
                    body,
                    parallel,
                } => {
                    trace!(key = key.as_str(), parallel = parallel, "adding task");
                    if parallel {
                        self.spawn_parallel(key, body);
                    } else {
                        let now = self.clock.now();
                        self.blocking.insert(
                            key,
                            BlockingTask {
                                body,
                                next_resume: now,
                                done: false,
                            },
                        );
                    }
                }
                PendingOp::Remove { key } => {
                    self.blocking.remove(&key);
                    self.parallel.remove(&key);
                }
                PendingOp::RemoveAll => {
                    self.blocking.clear();
                    self.blocking.resize(1);
                    self.parallel.clear();
                    self.parallel.resize(1);
                }
            }
        }
    }

    /// Runs the body to completion on the pool; completion is signalled
    /// through a one-shot channel polled by `update`.
    fn spawn_parallel(&mut self, key: TaskKey, body: TaskBody) {
        if self.parallel.contains_key(&key) {
            return;
        }
        let (sender, receiver) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let worker_key = key.clone();
        self.pool.spawn(move || {
            let mut body = body;
            loop {
                match catch_unwind(AssertUnwindSafe(|| body())) {
                    Ok(Ok(Step::Yield)) => std::thread::yield_now(),
                    Ok(Ok(Step::Sleep(delay))) => std::thread::sleep(delay),
                    Ok(Ok(Step::Done)) => break,
                    Ok(Err(error)) => {
                        shared.push_error(TaskError {
                            key: worker_key.clone(),
                            message: error.to_string(),
                        });
                        break;
                    }
                    Err(panic) => {
                        shared.push_error(TaskError {
                            key: worker_key.clone(),
                            message: panic_message(&panic),
                        });
                        break;
                    }
                }
            }
            let _ = sender.send(());
        });
        self.parallel.insert(key, ParallelTask { completion: receiver });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
