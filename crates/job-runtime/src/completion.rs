//! Hand-off of finished jobs from worker threads back to the runtime thread.
//!
//! Workers only ever push; the owning runtime is the only consumer. The queue is
//! unbounded so a worker never blocks on a slow runtime.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::pool::{ErasedWork, JobId};

/// A job whose work step has finished (or panicked).
pub(crate) struct Completed {
    pub(crate) id: JobId,
    pub(crate) job: Box<dyn ErasedWork>,
    pub(crate) panicked: bool,
}

/// Multi-producer, single-consumer queue of finished jobs.
pub struct CompletionQueue {
    tx: Sender<Completed>,
    rx: Receiver<Completed>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Finished jobs waiting to be reaped (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) fn sender(&self) -> Sender<Completed> {
        self.tx.clone()
    }

    pub(crate) fn try_pop(&self) -> Option<Completed> {
        self.rx.try_recv().ok()
    }

    /// Block until a job completes.
    ///
    /// Never reports disconnection: the queue keeps its own sender alive.
    pub(crate) fn pop_blocking(&self) -> Option<Completed> {
        self.rx.recv().ok()
    }

    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Completed> {
        match self.rx.recv_timeout(timeout) {
            Ok(done) => Some(done),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Work;
    use std::thread;

    struct Noop;

    impl Work for Noop {
        fn work(&mut self) {}
    }

    fn completed(id: u64) -> Completed {
        Completed {
            id: JobId(id),
            job: Box::new(Noop),
            panicked: false,
        }
    }

    #[test]
    fn try_pop_empty() {
        let q = CompletionQueue::new();
        assert!(q.is_empty());
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn collects_from_many_producers() {
        let q = CompletionQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let tx = q.sender();
                thread::spawn(move || {
                    tx.send(completed(id)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut ids: Vec<u64> = std::iter::from_fn(|| q.try_pop().map(|c| c.id.get())).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn pop_timeout_returns_none_when_idle() {
        let q = CompletionQueue::new();
        assert!(q.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn pop_blocking_waits_for_producer() {
        let q = CompletionQueue::new();
        let tx = q.sender();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(completed(9)).unwrap();
        });
        let done = q.pop_blocking().unwrap();
        assert_eq!(done.id, JobId(9));
        handle.join().unwrap();
    }
}
