//! Fixed pool of worker threads executing blocking job bodies.
//!
//! Workers pull [`Envelope`]s from one shared crossbeam queue, run the job's
//! [`Work::work`] step, and send the finished job to the completion queue named
//! in the envelope. A pool does not know about any runtime; several runtimes may
//! share one pool through an `Arc`.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::completion::Completed;
use crate::config::RuntimeConfig;

/// Blocking body of a job, executed on a worker thread.
///
/// `work` may only touch data owned by the job itself. Everything a runtime
/// thread can reach stays on that thread, which is what the `Send + 'static`
/// bound enforces.
pub trait Work: Send + 'static {
    fn work(&mut self);
}

/// Object-safe view of a [`Work`] that can be recovered as its concrete type.
pub(crate) trait ErasedWork: Send {
    fn run(&mut self);
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<W: Work> ErasedWork for W {
    fn run(&mut self) {
        Work::work(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Identifier of one submitted job, unique within its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// A job travelling to a worker, with the queue its completion goes back to.
pub(crate) struct Envelope {
    pub(crate) id: JobId,
    pub(crate) job: Box<dyn ErasedWork>,
    pub(crate) done: Sender<Completed>,
}

/// Reasons a job could not be handed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The bounded work queue is full.
    QueueFull,
    /// The pool has been shut down.
    ShutDown,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::QueueFull => f.write_str("worker queue is full"),
            SubmitError::ShutDown => f.write_str("worker pool is shut down"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Fixed set of worker threads sharing one work queue.
pub struct WorkerPool {
    work_tx: Mutex<Option<Sender<Envelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Start `config.workers` threads.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let (work_tx, work_rx) = match config.queue_capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let rx = work_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name))
                .spawn(move || worker_loop(index, rx))
                .with_context(|| format!("spawn worker thread {index}"))?;
            workers.push(handle);
        }

        tracing::info!(
            workers = config.workers,
            queue_capacity = ?config.queue_capacity,
            "worker pool started"
        );

        Ok(Self {
            work_tx: Mutex::new(Some(work_tx)),
            workers: Mutex::new(workers),
            size: config.workers,
        })
    }

    /// Number of worker threads the pool was started with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs waiting for a worker (best-effort snapshot).
    pub fn queued(&self) -> usize {
        let g = self.work_tx.lock().unwrap();
        g.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }

    /// Hand one job to the pool without blocking.
    pub(crate) fn dispatch(&self, envelope: Envelope) -> Result<(), SubmitError> {
        let g = self.work_tx.lock().unwrap();
        let Some(tx) = g.as_ref() else {
            return Err(SubmitError::ShutDown);
        };
        match tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::ShutDown),
        }
    }

    /// Stop accepting jobs, let workers drain the queue, and join them.
    ///
    /// Idempotent. Jobs already queued still run and deliver their completions.
    pub fn shutdown(&self) {
        let tx = self.work_tx.lock().unwrap().take();
        drop(tx);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        if workers.is_empty() {
            return;
        }
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("worker thread exited abnormally");
            }
        }
        tracing::info!(workers = self.size, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, work_rx: Receiver<Envelope>) {
    tracing::debug!(worker = index, "worker started");

    while let Ok(Envelope { id, mut job, done }) = work_rx.recv() {
        let panicked = panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_err();
        if panicked {
            tracing::error!(worker = index, job = id.get(), "job work panicked");
        }
        // A closed completion queue means its runtime is gone; the job is dropped here.
        let _ = done.send(Completed { id, job, panicked });
    }

    tracing::debug!(worker = index, "worker stopped");
}
