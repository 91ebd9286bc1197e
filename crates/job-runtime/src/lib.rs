//! Offload blocking work from a single-threaded cooperative runtime.
//!
//! ## Pieces
//! 1. [`WorkerPool`]: fixed OS threads that run job bodies ([`Work`]).
//! 2. [`CompletionQueue`]: workers hand finished jobs back to the runtime thread.
//! 3. [`Runtime`]: polls `!Send` tasks and reaps finished jobs between rounds.
//!
//! A job moves submitted -> running (one worker) -> completed (queue) -> reaped
//! (runtime thread) -> dropped, and is owned by exactly one stage at a time.

pub mod completion;
pub mod config;
pub mod pending;
pub mod pool;
pub mod runtime;

pub use completion::CompletionQueue;
pub use config::RuntimeConfig;
pub use pending::Pending;
pub use pool::{JobId, SubmitError, Work, WorkerPool};
pub use runtime::{JobError, Runtime, RuntimeHandle, Stalled};
