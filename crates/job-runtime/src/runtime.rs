//! Single-threaded cooperative scheduler that offloads blocking work.
//!
//! ## Model
//! - Logical tasks are `!Send` futures spawned on a [`Runtime`] and polled only
//!   on the thread that owns it.
//! - A task offloads blocking work with [`RuntimeHandle::run`] and suspends on
//!   the returned [`Pending`] until the job is reaped.
//! - Workers push finished jobs onto the runtime's [`CompletionQueue`]. Between
//!   scheduling rounds the runtime drains that queue and runs each job's reap
//!   step on its own thread, in completion order.
//!
//! A job's reap never runs while a task is being polled, so a task that submits
//! a job always suspends at least once before seeing the result.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Wake, Waker};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};

use crate::completion::{Completed, CompletionQueue};
use crate::config::RuntimeConfig;
use crate::pending::{self, Pending};
use crate::pool::{Envelope, ErasedWork, JobId, SubmitError, Work, WorkerPool};

/// Why a job did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// The pool refused the job; its work never ran.
    Rejected(SubmitError),
    /// The work step panicked; the job was discarded at reap time.
    Lost,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Rejected(e) => write!(f, "job rejected: {e}"),
            JobError::Lost => f.write_str("job lost: work step panicked"),
        }
    }
}

impl std::error::Error for JobError {}

impl From<SubmitError> for JobError {
    fn from(e: SubmitError) -> Self {
        JobError::Rejected(e)
    }
}

/// Returned by [`Runtime::block_on`] when the future can no longer make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stalled;

impl fmt::Display for Stalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("future stalled: no ready tasks and no jobs in flight")
    }
}

impl std::error::Error for Stalled {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TaskId(u64);

type LocalTask = Pin<Box<dyn Future<Output = ()>>>;
type Reap = Box<dyn FnOnce(Result<Box<dyn ErasedWork>, JobError>)>;

struct TaskWaker {
    id: TaskId,
    ready: Sender<TaskId>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        // The runtime may be gone; a late wake is harmless.
        let _ = self.ready.send(self.id);
    }
}

struct Inner {
    pool: Arc<WorkerPool>,
    completions: CompletionQueue,
    reaps: RefCell<HashMap<JobId, Reap>>,
    next_job: Cell<u64>,
    tasks: RefCell<HashMap<TaskId, LocalTask>>,
    next_task: Cell<u64>,
    ready_tx: Sender<TaskId>,
    ready_rx: Receiver<TaskId>,
}

/// Cheap, cloneable, thread-bound handle used by tasks to submit jobs and spawn tasks.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Rc<Inner>,
}

/// Owner of the scheduler loop.
pub struct Runtime {
    handle: RuntimeHandle,
}

impl Runtime {
    /// Start a runtime with its own worker pool.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let pool = WorkerPool::new(config)?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Build a runtime on top of an existing (possibly shared) pool.
    pub fn with_pool(pool: Arc<WorkerPool>) -> Self {
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
        Self {
            handle: RuntimeHandle {
                inner: Rc::new(Inner {
                    pool,
                    completions: CompletionQueue::new(),
                    reaps: RefCell::new(HashMap::new()),
                    next_job: Cell::new(0),
                    tasks: RefCell::new(HashMap::new()),
                    next_task: Cell::new(0),
                    ready_tx,
                    ready_rx,
                }),
            },
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    pub fn spawn<F>(&self, fut: F) -> Pending<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.handle.spawn(fut)
    }

    /// One scheduling round: poll every ready task, then reap every finished job.
    ///
    /// Returns `true` if anything was polled or reaped.
    pub fn turn(&self) -> bool {
        let inner = &self.handle.inner;
        let mut progressed = false;

        while let Ok(id) = inner.ready_rx.try_recv() {
            self.poll_task(id);
            progressed = true;
        }

        while let Some(done) = inner.completions.try_pop() {
            self.reap(done);
            progressed = true;
        }

        progressed
    }

    /// Wait up to `timeout` for a job to finish, then run one round.
    ///
    /// Lets an embedding event loop interleave its own work with the runtime.
    pub fn turn_timeout(&self, timeout: Duration) -> bool {
        if self.turn() {
            return true;
        }
        match self.handle.inner.completions.pop_timeout(timeout) {
            Some(done) => {
                self.reap(done);
                self.turn();
                true
            }
            None => false,
        }
    }

    /// Run until no task is ready and no job is in flight.
    pub fn run(&self) {
        while self.step() {}
    }

    /// Drive `fut` to completion, running other tasks and reaping jobs meanwhile.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output, Stalled>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let task = self.spawn(fut);
        loop {
            if let Some(out) = task.try_take() {
                return Ok(out);
            }
            if !self.step() {
                return task.try_take().ok_or(Stalled);
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.handle.in_flight()
    }

    /// Make progress, blocking on the completion queue only when nothing else can run.
    fn step(&self) -> bool {
        if self.turn() {
            return true;
        }
        if self.handle.in_flight() == 0 {
            return false;
        }
        match self.handle.inner.completions.pop_blocking() {
            Some(done) => {
                self.reap(done);
                true
            }
            None => false,
        }
    }

    fn poll_task(&self, id: TaskId) {
        let inner = &self.handle.inner;
        // Missing means finished already; duplicate wakes are expected.
        let task = inner.tasks.borrow_mut().remove(&id);
        let Some(mut task) = task else {
            return;
        };

        let waker = Waker::from(Arc::new(TaskWaker {
            id,
            ready: inner.ready_tx.clone(),
        }));
        let mut cx = Context::from_waker(&waker);
        if task.as_mut().poll(&mut cx).is_pending() {
            inner.tasks.borrow_mut().insert(id, task);
        }
    }

    fn reap(&self, done: Completed) {
        let Completed { id, job, panicked } = done;
        let reap = self.handle.inner.reaps.borrow_mut().remove(&id);
        let Some(reap) = reap else {
            tracing::warn!(job = id.get(), "completion for unknown job dropped");
            return;
        };

        if panicked {
            drop(job);
            reap(Err(JobError::Lost));
        } else {
            reap(Ok(job));
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Tasks hold handles back to `Inner`; break the cycle before the last handle goes.
        let tasks = std::mem::take(&mut *self.handle.inner.tasks.borrow_mut());
        drop(tasks);
        let reaps = std::mem::take(&mut *self.handle.inner.reaps.borrow_mut());
        drop(reaps);
    }
}

impl RuntimeHandle {
    /// Queue `work` on the pool; `reap` runs on the runtime thread once it finishes.
    ///
    /// This is the low-level primitive: `reap` receives the finished job by value
    /// and owns every buffer in it. On rejection neither callback runs and the
    /// job is dropped before this returns.
    pub fn submit<W, R>(&self, work: W, reap: R) -> Result<JobId, SubmitError>
    where
        W: Work,
        R: FnOnce(Result<W, JobError>) + 'static,
    {
        let id = JobId(self.inner.next_job.get());
        self.inner.next_job.set(id.0 + 1);

        self.inner.pool.dispatch(Envelope {
            id,
            job: Box::new(work),
            done: self.inner.completions.sender(),
        })?;

        let reap: Reap = Box::new(move |outcome| {
            let outcome = outcome.and_then(|job| match job.into_any().downcast::<W>() {
                Ok(job) => Ok(*job),
                Err(_) => {
                    tracing::error!(job = id.get(), "completed job has unexpected type");
                    Err(JobError::Lost)
                }
            });
            reap(outcome);
        });
        self.inner.reaps.borrow_mut().insert(id, reap);
        Ok(id)
    }

    /// Queue `work` and return a [`Pending`] resolved with `finish(job)` at reap time.
    ///
    /// `finish` runs on the runtime thread; whatever it does not move into its
    /// result is dropped right after it returns.
    pub fn run<W, T, F>(&self, work: W, finish: F) -> Pending<Result<T, JobError>>
    where
        W: Work,
        T: 'static,
        F: FnOnce(W) -> T + 'static,
    {
        let (pending, resume) = pending::pair();
        let submitted = self.submit(work, move |outcome: Result<W, JobError>| {
            resume.deliver(outcome.map(finish));
        });
        match submitted {
            Ok(_) => pending,
            Err(e) => Pending::ready(Err(JobError::Rejected(e))),
        }
    }

    /// Spawn a logical task on the runtime.
    pub fn spawn<F>(&self, fut: F) -> Pending<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (pending, resume) = pending::pair();
        let task: LocalTask = Box::pin(async move {
            resume.deliver(fut.await);
        });

        let id = TaskId(self.inner.next_task.get());
        self.inner.next_task.set(id.0 + 1);
        self.inner.tasks.borrow_mut().insert(id, task);
        let _ = self.inner.ready_tx.send(id);
        pending
    }

    /// Jobs submitted but not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.inner.reaps.borrow().len()
    }

    /// Tasks spawned but not yet finished.
    pub fn live_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.inner.pool
    }
}
