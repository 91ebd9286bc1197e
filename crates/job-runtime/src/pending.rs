//! Single-delivery result slots shared between a suspended task and its resumer.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct Slot<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

/// Resumer side of a [`Pending`]. Consumed by delivery, so a value is delivered at most once.
pub(crate) struct Resume<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

/// A value that will be delivered exactly once on the runtime thread.
///
/// Returned by [`RuntimeHandle::run`](crate::RuntimeHandle::run) for job results
/// and by [`RuntimeHandle::spawn`](crate::RuntimeHandle::spawn) for task outputs.
/// Awaiting it suspends the current task until the runtime delivers the value.
#[must_use = "a pending value does nothing unless awaited or polled via try_take"]
pub struct Pending<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

pub(crate) fn pair<T>() -> (Pending<T>, Resume<T>) {
    let slot = Rc::new(RefCell::new(Slot {
        value: None,
        waker: None,
    }));
    (Pending { slot: slot.clone() }, Resume { slot })
}

impl<T> Resume<T> {
    /// Store `value` and wake the task waiting on it, if any.
    pub(crate) fn deliver(self, value: T) {
        let waker = {
            let mut slot = self.slot.borrow_mut();
            slot.value = Some(value);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T> Pending<T> {
    /// A pending value that is already resolved.
    pub(crate) fn ready(value: T) -> Self {
        let (pending, resume) = pair();
        resume.deliver(value);
        pending
    }

    /// Take the value if it has been delivered.
    pub fn try_take(&self) -> Option<T> {
        self.slot.borrow_mut().value.take()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().value.is_some()
    }
}

impl<T> Future for Pending<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.slot.borrow_mut();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn deliver_wakes_registered_waker_once() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let (mut pending, resume) = pair::<u32>();
        assert!(Pin::new(&mut pending).poll(&mut cx).is_pending());
        resume.deliver(5);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(Pin::new(&mut pending).poll(&mut cx), Poll::Ready(5));
    }

    #[test]
    fn try_take_returns_value_once() {
        let pending = Pending::ready("done");
        assert!(pending.is_ready());
        assert_eq!(pending.try_take(), Some("done"));
        assert_eq!(pending.try_take(), None);
    }

    #[test]
    fn deliver_without_waiter_keeps_value() {
        let (pending, resume) = pair::<Vec<u8>>();
        assert!(!pending.is_ready());
        resume.deliver(vec![1, 2]);
        assert_eq!(pending.try_take(), Some(vec![1, 2]));
    }
}
