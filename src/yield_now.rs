//! Self-conflating yield to the next executor turn.
//!
//! Channels and [`Select`](crate::select::Select) both suspend at least
//! once per call so that two tasks that only ever hand values directly to
//! each other (never touching real I/O) cannot starve the rest of the
//! executor in an endless chain of immediately-ready microtasks. The
//! mechanism mirrors the single-poll self-wake trick used by
//! `futures_executor::LocalPool`'s run loop (park, wait for a wake, poll
//! again) but adapted so that many callers racing to yield within the same
//! turn share one boundary instead of each scheduling their own: the
//! *shared handle* is what the spec calls self-conflating.
//!
//! Built the way the oneshot channel found in the `local-sync` corpus
//! builds its single-slot rendezvous: one `Rc<RefCell<_>>`, no atomics,
//! because nothing here ever crosses a thread.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct YieldState {
    generation: u64,
    armed: bool,
    wakers: Vec<Waker>,
}

/// A handle shared by every channel/select operation on the same executor
/// turn, tracking how many macrotask boundaries have elapsed.
#[derive(Clone)]
pub(crate) struct YieldHandle {
    state: Rc<RefCell<YieldState>>,
}

impl YieldHandle {
    pub(crate) fn new() -> Self {
        YieldHandle {
            state: Rc::new(RefCell::new(YieldState {
                generation: 0,
                armed: false,
                wakers: Vec::new(),
            })),
        }
    }

    /// The current generation. Wraps from `u64::MAX` to `0`.
    pub(crate) fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Returns a future that resolves after the next macrotask boundary.
    /// Calling this repeatedly before the boundary fires returns futures
    /// that all resolve together, at the cost of one shared turn rather
    /// than one turn per caller.
    pub(crate) fn yield_now(&self) -> YieldNow {
        YieldNow {
            state: self.state.clone(),
            baseline: self.generation(),
            registered: false,
        }
    }
}

thread_local! {
    static CURRENT: YieldHandle = YieldHandle::new();
}

/// The process-wide yield boundary shared by every channel and
/// [`Select`](crate::select::Select) operation — there is exactly one
/// macrotask queue in a single-threaded cooperative runtime, so there is
/// exactly one generation counter for it.
pub(crate) fn current() -> YieldHandle {
    CURRENT.with(|handle| handle.clone())
}

/// The current macrotask generation of the process-wide yield boundary
/// every channel/`Select` operation shares. Wraps from `u64::MAX` to `0`.
pub fn yield_generation() -> u64 {
    current().generation()
}

/// Returns a future that resolves after the next macrotask boundary —
/// the same boundary `Sender::send`/`Receiver::receive`/`Select::wait`
/// yield to internally. Calling this repeatedly before the boundary
/// fires shares one turn across every caller rather than scheduling one
/// per caller.
pub fn yield_to_macrotask() -> impl Future<Output = ()> {
    current().yield_now()
}

pub(crate) struct YieldNow {
    state: Rc<RefCell<YieldState>>,
    baseline: u64,
    registered: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut st = self.state.borrow_mut();
        if st.generation != self.baseline {
            return Poll::Ready(());
        }

        if self.registered {
            // We were the one that armed the boundary; this is our second
            // poll, i.e. the boundary itself.
            st.generation = st.generation.wrapping_add(1);
            st.armed = false;
            let wakers = std::mem::take(&mut st.wakers);
            drop(st);
            for waker in wakers {
                waker.wake();
            }
            return Poll::Ready(());
        }

        st.wakers.push(cx.waker().clone());
        if !st.armed {
            st.armed = true;
            // Ask the executor for one more turn; our next poll performs
            // the actual boundary flip above.
            cx.waker().wake_by_ref();
        }
        self.registered = true;
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::task::noop_waker_ref;

    fn poll_once<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(noop_waker_ref());
        Pin::new(fut).poll(&mut cx)
    }

    #[test]
    fn single_waiter_needs_two_polls() {
        let handle = YieldHandle::new();
        let mut fut = handle.yield_now();
        assert_eq!(poll_once(&mut fut), Poll::Pending);
        assert_eq!(poll_once(&mut fut), Poll::Ready(()));
        assert_eq!(handle.generation(), 1);
    }

    #[test]
    fn concurrent_waiters_share_one_boundary() {
        let handle = YieldHandle::new();
        let mut a = handle.yield_now();
        let mut b = handle.yield_now();
        assert_eq!(poll_once(&mut a), Poll::Pending);
        assert_eq!(poll_once(&mut b), Poll::Pending);
        // Driving `a` to completion also completes `b`, without a second
        // turn having to be separately scheduled for it.
        assert_eq!(poll_once(&mut a), Poll::Ready(()));
        assert_eq!(poll_once(&mut b), Poll::Ready(()));
        assert_eq!(handle.generation(), 1);
    }

    #[test]
    fn generation_wraps() {
        let handle = YieldHandle::new();
        handle.state.borrow_mut().generation = u64::MAX;
        let mut fut = handle.yield_now();
        assert_eq!(poll_once(&mut fut), Poll::Pending);
        assert_eq!(poll_once(&mut fut), Poll::Ready(()));
        assert_eq!(handle.generation(), 0);
    }
}
