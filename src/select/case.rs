//! The three concrete case kinds a [`Select`](super::Select) can hold,
//! behind one object-safe [`SelectCase`] trait so a single `Select` can
//! mix sends, receives, and arbitrary futures — something the
//! specification's structurally-typed case records can do directly, but
//! Rust can only express through a trait object.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::channel::{self, Receiver, Sender};
use crate::error::SendError;

/// One entry in a [`Select`](super::Select)'s case list.
///
/// `try_ready` must never leave a side effect behind when it returns
/// `false` — that's what lets a `Select` try several cases in random
/// order without committing to one before it knows which (if any) are
/// immediately ready, mirroring how Go's runtime locks and inspects every
/// channel in a `select` before committing to a branch.
pub(crate) trait SelectCase {
    fn try_ready(&mut self) -> bool;
    fn register(&mut self, waker: &Waker);
    fn poll_registered(&mut self, waker: &Waker) -> bool;
    fn withdraw(&mut self);
    fn take_result(&mut self) -> Box<dyn Any>;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `true` if, once `take_result` has consumed this case's outcome, the
    /// case must be spliced out of the `Select`'s pending set rather than
    /// stay reusable. Per spec.md §3.2: channel cases remain reusable
    /// across `wait` invocations, but an external-value case "once
    /// consumed... disappears from the pending set". Defaults to `false`
    /// (the reusable case).
    fn removed_after_take(&self) -> bool {
        false
    }
}

struct Slot<R> {
    value: Option<R>,
    waker: Option<Waker>,
}

pub(crate) struct SendCase<T> {
    sender: Sender<T>,
    value: Option<T>,
    handle: Option<channel::SenderHandle<T>>,
    slot: Option<Rc<std::cell::RefCell<Slot<Result<(), SendError>>>>>,
    result: Option<Result<(), SendError>>,
}

impl<T> SendCase<T> {
    pub(crate) fn new(sender: Sender<T>, value: T) -> Self {
        SendCase { sender, value: Some(value), handle: None, slot: None, result: None }
    }

    /// Re-arms this case with a fresh value to send on the next `wait`,
    /// as if it had just been constructed. Used by
    /// [`SelectFactory`](super::SelectFactory) to reuse a `Select`
    /// across loop iterations instead of rebuilding its case list.
    pub(crate) fn reset(&mut self, value: T) {
        self.value = Some(value);
        self.handle = None;
        self.slot = None;
        self.result = None;
    }
}

impl<T: 'static> SelectCase for SendCase<T> {
    fn try_ready(&mut self) -> bool {
        let value = match self.value.take() {
            Some(v) => v,
            None => return self.result.is_some(),
        };
        match self.sender.try_send(value) {
            Ok(()) => {
                self.result = Some(Ok(()));
                true
            }
            Err(e) => {
                if e.is_disconnected() {
                    self.result = Some(Err(SendError::closed()));
                    true
                } else {
                    self.value = Some(e.into_inner());
                    false
                }
            }
        }
    }

    fn register(&mut self, waker: &Waker) {
        use std::cell::RefCell;
        let slot = Rc::new(RefCell::new(Slot { value: None, waker: Some(waker.clone()) }));
        let slot_for_cb = slot.clone();
        let value = self.value.take().expect("register called after value consumed");
        let mut value = Some(value);
        let cb: channel::SenderCallback<T> = Box::new(move |signal| {
            let (outcome, produced) = match signal {
                channel::SendSignal::Ok => {
                    let v = value.take().expect("sender callback invoked twice");
                    (Ok(()), Ok(v))
                }
                channel::SendSignal::Closed(e) => (Err(SendError::closed()), Err(e)),
            };
            let mut guard = slot_for_cb.borrow_mut();
            let waker = guard.waker.take();
            guard.value = Some(outcome);
            drop(guard);
            if let Some(w) = waker {
                w.wake();
            }
            produced
        });
        match channel::add_sender(self.sender.inner(), cb) {
            Ok(channel::AddOutcome::Inline) => {
                self.result = slot.borrow_mut().value.take();
            }
            Ok(channel::AddOutcome::Enqueued(handle)) => {
                self.handle = Some(handle);
                self.slot = Some(slot);
            }
            Err(_) => {
                self.result = Some(Err(SendError::closed()));
            }
        }
    }

    fn poll_registered(&mut self, waker: &Waker) -> bool {
        if self.result.is_some() {
            return true;
        }
        let Some(slot) = &self.slot else { return false };
        let mut guard = slot.borrow_mut();
        match guard.value.take() {
            Some(outcome) => {
                drop(guard);
                self.result = Some(outcome);
                true
            }
            None => {
                guard.waker = Some(waker.clone());
                false
            }
        }
    }

    fn withdraw(&mut self) {
        if let Some(handle) = self.handle.take() {
            channel::remove_sender(self.sender.inner(), &handle);
        }
    }

    fn take_result(&mut self) -> Box<dyn Any> {
        Box::new(self.result.take().expect("case resolved without a result"))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) struct RecvCase<T> {
    receiver: Receiver<T>,
    handle: Option<channel::ReceiverHandle<T>>,
    slot: Option<Rc<std::cell::RefCell<Slot<(Option<T>, bool)>>>>,
    result: Option<(Option<T>, bool)>,
}

impl<T> RecvCase<T> {
    pub(crate) fn new(receiver: Receiver<T>) -> Self {
        RecvCase { receiver, handle: None, slot: None, result: None }
    }
}

impl<T: 'static> SelectCase for RecvCase<T> {
    fn try_ready(&mut self) -> bool {
        match self.receiver.try_receive() {
            channel::TryReceive::Value(v) => {
                self.result = Some((Some(v), true));
                true
            }
            channel::TryReceive::Closed(default) => {
                self.result = Some((default, false));
                true
            }
            channel::TryReceive::Empty => false,
        }
    }

    fn register(&mut self, waker: &Waker) {
        use std::cell::RefCell;
        let slot = Rc::new(RefCell::new(Slot { value: None, waker: Some(waker.clone()) }));
        let slot_for_cb = slot.clone();
        let cb: channel::ReceiverCallback<T> = Box::new(move |value, ok| {
            let mut guard = slot_for_cb.borrow_mut();
            let waker = guard.waker.take();
            guard.value = Some((value, ok));
            drop(guard);
            if let Some(w) = waker {
                w.wake();
            }
        });
        match channel::add_receiver(self.receiver.inner(), cb) {
            Ok(channel::AddOutcome::Inline) => {
                self.result = slot.borrow_mut().value.take();
            }
            Ok(channel::AddOutcome::Enqueued(handle)) => {
                self.handle = Some(handle);
                self.slot = Some(slot);
            }
            Err(_) => {
                // A sender aborted mid-handoff and requeued itself; stay
                // pending, we'll be retried on the next registration pass.
            }
        }
    }

    fn poll_registered(&mut self, waker: &Waker) -> bool {
        if self.result.is_some() {
            return true;
        }
        let Some(slot) = &self.slot else { return false };
        let mut guard = slot.borrow_mut();
        match guard.value.take() {
            Some(outcome) => {
                drop(guard);
                self.result = Some(outcome);
                true
            }
            None => {
                guard.waker = Some(waker.clone());
                false
            }
        }
    }

    fn withdraw(&mut self) {
        if let Some(handle) = self.handle.take() {
            channel::remove_receiver(self.receiver.inner(), &handle);
        }
    }

    fn take_result(&mut self) -> Box<dyn Any> {
        Box::new(self.result.take().expect("case resolved without a result"))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) struct ExternalCase<F: Future> {
    future: Pin<Box<F>>,
    result: Option<F::Output>,
    consumed: bool,
}

impl<F: Future> ExternalCase<F> {
    pub(crate) fn new(future: F) -> Self {
        ExternalCase { future: Box::pin(future), result: None, consumed: false }
    }
}

impl<F: Future> SelectCase for ExternalCase<F>
where
    F::Output: 'static,
{
    fn try_ready(&mut self) -> bool {
        if self.consumed {
            return false;
        }
        if self.result.is_some() {
            return true;
        }
        let waker = futures_task::noop_waker_ref();
        let mut cx = Context::from_waker(waker);
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(v) => {
                self.result = Some(v);
                true
            }
            Poll::Pending => false,
        }
    }

    fn register(&mut self, waker: &Waker) {
        if self.consumed || self.result.is_some() {
            return;
        }
        let mut cx = Context::from_waker(waker);
        if let Poll::Ready(v) = self.future.as_mut().poll(&mut cx) {
            self.result = Some(v);
        }
    }

    fn poll_registered(&mut self, waker: &Waker) -> bool {
        if self.consumed {
            return false;
        }
        if self.result.is_some() {
            return true;
        }
        let mut cx = Context::from_waker(waker);
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(v) => {
                self.result = Some(v);
                true
            }
            Poll::Pending => false,
        }
    }

    fn withdraw(&mut self) {
        // Dropping the future (on the whole case being discarded) is the
        // only withdrawal a bare `Future` supports; nothing to do here
        // since the case itself is kept around until `Select` is reused.
    }

    fn take_result(&mut self) -> Box<dyn Any> {
        self.consumed = true;
        Box::new(self.result.take().expect("case resolved without a result"))
    }

    fn removed_after_take(&self) -> bool {
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
