//! A typed, optionally-buffered FIFO channel between an arbitrary number of
//! senders and receivers.
//!
//! Generalizes `futures_channel::mpsc::{Sender, Receiver}` from a
//! thread-safe `Arc<Mutex<_>>`/atomic `BoundedInner` to a single-owner
//! `Rc<RefCell<_>>` `ChannelInner`: there is exactly one cooperative task
//! running at a time, so the "park a task handle, wake it from the peer
//! side" dance the teacher needs atomics for collapses into plain
//! `VecDeque` pushes and direct closure calls.

mod iter;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures_core::Stream;

use crate::error::{is_sentinel, ChannelError, SendError, TrySendError};
use crate::yield_now;

pub use self::iter::TryIter;

/// What a channel tells a parked sender callback when it is finally
/// invoked: either go ahead and produce the value, or the channel closed
/// out from under you.
pub enum SendSignal {
    /// A peer is ready; return the value to deliver.
    Ok,
    /// The channel closed before this callback could be satisfied; return
    /// (typically re-throwing) this error to propagate the failure.
    Closed(Rc<ChannelError>),
}

impl fmt::Debug for SendSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendSignal::Ok => write!(f, "Ok"),
            SendSignal::Closed(e) => f.debug_tuple("Closed").field(e).finish(),
        }
    }
}

/// A sender callback registered via [`Sender::add_sender`]: invoked at
/// most once, with [`SendSignal::Ok`] to produce the value to send or
/// [`SendSignal::Closed`] to report that the channel closed first.
/// Re-returning the exact `Rc` it was given for `Closed` is treated as a
/// sentinel and swallowed rather than surfaced as an error.
pub type SenderCallback<T> = Box<dyn FnOnce(SendSignal) -> Result<T, Rc<ChannelError>>>;
/// A receiver callback registered via [`Receiver::add_receiver`]: invoked
/// at most once, with the delivered value (or `None`) and whether the
/// channel was still open at delivery time.
pub type ReceiverCallback<T> = Box<dyn FnOnce(Option<T>, bool)>;

/// Identifies one callback queued by [`Sender::add_sender`], for passing
/// back to [`Sender::remove_sender`].
pub struct SenderSlot<T> {
    callback: RefCell<Option<SenderCallback<T>>>,
}

impl<T> fmt::Debug for SenderSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderSlot").field("queued", &self.callback.borrow().is_some()).finish()
    }
}

/// Handle to a callback queued by [`Sender::add_sender`].
pub type SenderHandle<T> = Rc<SenderSlot<T>>;

/// Identifies one callback queued by [`Receiver::add_receiver`], for
/// passing back to [`Receiver::remove_receiver`].
pub struct ReceiverSlot<T> {
    callback: RefCell<Option<ReceiverCallback<T>>>,
}

impl<T> fmt::Debug for ReceiverSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverSlot").field("queued", &self.callback.borrow().is_some()).finish()
    }
}

/// Handle to a callback queued by [`Receiver::add_receiver`].
pub type ReceiverHandle<T> = Rc<ReceiverSlot<T>>;

/// Outcome of a low-level registration: either it was satisfied
/// synchronously against the peer side, or it is now parked in a queue.
pub enum AddOutcome<H> {
    /// The callback already fired against a waiting peer or buffer room.
    Inline,
    /// The callback is now queued; hold on to the handle to withdraw it
    /// with `remove_sender`/`remove_receiver` if it's no longer wanted.
    Enqueued(H),
}

impl<H: fmt::Debug> fmt::Debug for AddOutcome<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddOutcome::Inline => write!(f, "Inline"),
            AddOutcome::Enqueued(h) => f.debug_tuple("Enqueued").field(h).finish(),
        }
    }
}

pub(crate) struct ChannelInner<T> {
    capacity: usize,
    buffer: crate::buffer::CircularBuffer<T>,
    send_queue: VecDeque<SenderHandle<T>>,
    recv_queue: VecDeque<ReceiverHandle<T>>,
    open: bool,
    default_factory: Option<Rc<dyn Fn() -> T>>,
    num_senders: usize,
    unsafe_mode: bool,
}

/// Creates a channel with room for `capacity` buffered values. `capacity
/// == 0` is a strict, unbuffered rendezvous.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    channel_inner(capacity, None)
}

/// Like [`channel`], but a closed, drained receive yields `factory()`
/// instead of an absent value.
pub fn channel_with_default<T>(
    capacity: usize,
    factory: impl Fn() -> T + 'static,
) -> (Sender<T>, Receiver<T>) {
    channel_inner(capacity, Some(Rc::new(factory) as Rc<dyn Fn() -> T>))
}

fn channel_inner<T>(
    capacity: usize,
    default_factory: Option<Rc<dyn Fn() -> T>>,
) -> (Sender<T>, Receiver<T>) {
    let inner = Rc::new(RefCell::new(ChannelInner {
        capacity,
        buffer: crate::buffer::CircularBuffer::new(capacity),
        send_queue: VecDeque::new(),
        recv_queue: VecDeque::new(),
        open: true,
        default_factory,
        num_senders: 1,
        unsafe_mode: false,
    }));
    let tx = Sender { inner: inner.clone() };
    let rx = Receiver { inner };
    (tx, rx)
}

/// The sending half of a channel. Cloneable: the channel stays open while
/// at least one `Sender` is alive.
pub struct Sender<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
}

/// The receiving half of a channel.
pub struct Receiver<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
}

/// What `try_receive` observed.
#[derive(Debug)]
pub enum TryReceive<T> {
    /// A value was available and has been removed from the channel.
    Value(T),
    /// The channel is closed and fully drained; carries the default value
    /// if the channel was built with one.
    Closed(Option<T>),
    /// Open, but nothing is ready right now.
    Empty,
}

impl<T> TryReceive<T> {
    /// Converts to the plain `Option` a [`Stream`] would report:
    /// `Some(value)` for a real item, `None` for closed-and-drained.
    /// Panics if called on `Empty` — check that case first.
    pub fn into_value_or_closed(self) -> Option<T> {
        match self {
            TryReceive::Value(v) => Some(v),
            TryReceive::Closed(_) => None,
            TryReceive::Empty => panic!("into_value_or_closed called on TryReceive::Empty"),
        }
    }
}

struct ResultSlot<R> {
    value: Option<R>,
    waker: Option<Waker>,
}

impl<R> ResultSlot<R> {
    fn new(waker: Waker) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(ResultSlot { value: None, waker: Some(waker) }))
    }
}

fn deliver_receiver<T>(handle: ReceiverHandle<T>, value: Option<T>, ok: bool) {
    if let Some(cb) = handle.callback.borrow_mut().take() {
        cb(value, ok);
    }
}

/// Registers a sender callback, delivering inline when possible per the
/// spec's "Delivery order (addSender, channel open)" rules.
pub(crate) fn add_sender<T>(
    inner: &Rc<RefCell<ChannelInner<T>>>,
    cb: SenderCallback<T>,
) -> Result<AddOutcome<SenderHandle<T>>, Rc<ChannelError>> {
    let mut guard = inner.borrow_mut();
    if !guard.open {
        return Err(Rc::new(ChannelError::SendOnClosedChannel));
    }

    if let Some(recv) = guard.recv_queue.pop_front() {
        drop(guard);
        return match cb(SendSignal::Ok) {
            Ok(value) => {
                deliver_receiver(recv, Some(value), true);
                Ok(AddOutcome::Inline)
            }
            Err(e) => {
                inner.borrow_mut().recv_queue.push_front(recv);
                Err(e)
            }
        };
    }

    if !guard.buffer.is_full() {
        drop(guard);
        let value = cb(SendSignal::Ok)?;
        inner
            .borrow_mut()
            .buffer
            .push(value)
            .ok()
            .expect("buffer had room under the lock that observed it");
        return Ok(AddOutcome::Inline);
    }

    let handle: SenderHandle<T> = Rc::new(SenderSlot { callback: RefCell::new(Some(cb)) });
    guard.send_queue.push_back(handle.clone());
    Ok(AddOutcome::Enqueued(handle))
}

/// Removes the last queued occurrence of `handle` from the send queue.
/// Idempotent.
pub(crate) fn remove_sender<T>(inner: &Rc<RefCell<ChannelInner<T>>>, handle: &SenderHandle<T>) {
    let mut guard = inner.borrow_mut();
    if let Some(pos) = guard.send_queue.iter().rposition(|h| Rc::ptr_eq(h, handle)) {
        guard.send_queue.remove(pos);
    }
}

/// Registers a receiver callback, delivering inline when possible per the
/// spec's "Delivery order (addReceiver, channel open)" rules.
pub(crate) fn add_receiver<T>(
    inner: &Rc<RefCell<ChannelInner<T>>>,
    cb: ReceiverCallback<T>,
) -> Result<AddOutcome<ReceiverHandle<T>>, Rc<ChannelError>> {
    let mut guard = inner.borrow_mut();

    if !guard.buffer.is_empty() {
        let value = guard.buffer.shift().expect("buffer reported non-empty");
        let mut drain_err = None;
        loop {
            if guard.buffer.is_full() {
                break;
            }
            let Some(sender) = guard.send_queue.pop_front() else { break };
            let Some(send_cb) = sender.callback.borrow_mut().take() else { continue };
            match send_cb(SendSignal::Ok) {
                Ok(v) => {
                    guard.buffer.push(v).ok().expect("checked not full above");
                }
                Err(e) => {
                    drain_err = Some(e);
                    break;
                }
            }
        }
        drop(guard);
        cb(Some(value), true);
        return match drain_err {
            Some(e) => Err(e),
            None => Ok(AddOutcome::Inline),
        };
    }

    if let Some(sender) = guard.send_queue.pop_front() {
        let taken = sender.callback.borrow_mut().take();
        drop(guard);
        return match taken {
            None => add_receiver(inner, cb),
            Some(send_cb) => match send_cb(SendSignal::Ok) {
                Ok(value) => {
                    cb(Some(value), true);
                    Ok(AddOutcome::Inline)
                }
                Err(e) => {
                    // The sender aborted before producing a value; the
                    // receiver never saw anything; requeue unconsumed.
                    let mut guard = inner.borrow_mut();
                    let handle: ReceiverHandle<T> =
                        Rc::new(ReceiverSlot { callback: RefCell::new(Some(cb)) });
                    guard.recv_queue.push_front(handle);
                    Err(e)
                }
            },
        };
    }

    if !guard.open {
        let default = guard.default_factory.as_ref().map(|f| f());
        drop(guard);
        cb(default, false);
        return Ok(AddOutcome::Inline);
    }

    let handle: ReceiverHandle<T> = Rc::new(ReceiverSlot { callback: RefCell::new(Some(cb)) });
    guard.recv_queue.push_back(handle.clone());
    Ok(AddOutcome::Enqueued(handle))
}

/// Removes the last queued occurrence of `handle` from the receive
/// queue. Idempotent.
pub(crate) fn remove_receiver<T>(inner: &Rc<RefCell<ChannelInner<T>>>, handle: &ReceiverHandle<T>) {
    let mut guard = inner.borrow_mut();
    if let Some(pos) = guard.recv_queue.iter().rposition(|h| Rc::ptr_eq(h, handle)) {
        guard.recv_queue.remove(pos);
    }
}

impl<T> Sender<T> {
    /// Non-blocking send. Hands off to a waiting receiver, else buffers,
    /// else fails with [`TrySendError::is_full`].
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut guard = self.inner.borrow_mut();
        if !guard.open {
            return Err(TrySendError::closed(value));
        }
        if let Some(recv) = guard.recv_queue.pop_front() {
            drop(guard);
            deliver_receiver(recv, Some(value), true);
            return Ok(());
        }
        match guard.buffer.push(value) {
            Ok(()) => Ok(()),
            Err(value) => Err(TrySendError::full(value)),
        }
    }

    /// Sends `value`, suspending until it has been handed off to a
    /// receiver or buffered. Yields to the next executor turn before
    /// returning unless a yield has already happened this turn (or
    /// [`Sender::set_unsafe`] has disabled yielding).
    pub async fn send(&self, value: T) -> Result<(), SendError> {
        let yielder = yield_now::current();
        let baseline = yielder.generation();
        let result = SendReady::new(self.inner.clone(), value).await;
        if !self.inner.borrow().unsafe_mode && yielder.generation() == baseline {
            yielder.yield_now().await;
        }
        result
    }

    /// Sends `value`, racing the send against `cancel`. If `cancel` fires
    /// first, the pending registration is withdrawn and `Err(reason)` is
    /// returned.
    pub async fn send_cancellable<E: Clone + 'static>(
        &self,
        value: T,
        cancel: crate::cancel::CancelToken<E>,
    ) -> Result<Result<(), SendError>, E>
    where
        T: 'static,
    {
        if let Some(reason) = cancel.peek() {
            return Err(reason);
        }
        let mut select = crate::select::Select::new();
        let send_id = select.push_send(self.clone(), value);
        let winner = select.wait_cancellable(cancel).await?;
        debug_assert_eq!(winner, send_id);
        Ok(select.take_result(send_id))
    }

    /// Disables the per-call macrotask yield on this channel (shared by
    /// every clone of this `Sender`/the paired `Receiver`). Intended for
    /// benchmarks that already control their own scheduling.
    pub fn set_unsafe(&self, unsafe_mode: bool) {
        self.inner.borrow_mut().unsafe_mode = unsafe_mode;
    }

    /// Closes the channel. See [`Receiver::close`] for the full policy;
    /// either half may initiate it.
    pub fn close(&self) -> Result<(), Rc<ChannelError>> {
        close_channel(&self.inner)
    }

    /// Maximum number of buffered values.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Number of values currently buffered.
    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    /// `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().buffer.is_empty()
    }

    /// Pending senders minus pending receivers: positive when senders are
    /// blocked waiting for room, negative when receivers are blocked
    /// waiting for a value.
    pub fn concurrency(&self) -> isize {
        let guard = self.inner.borrow();
        guard.send_queue.len() as isize - guard.recv_queue.len() as isize
    }

    /// Low-level registration used to build custom send protocols (this
    /// is what [`Select`](crate::select::Select)'s send case is built on
    /// top of). Delivers `cb` synchronously against a waiting receiver or
    /// buffer room when possible; otherwise queues it and returns a
    /// handle for [`remove_sender`](Sender::remove_sender). Fails if the
    /// channel is already closed.
    pub fn add_sender(&self, cb: SenderCallback<T>) -> Result<AddOutcome<SenderHandle<T>>, Rc<ChannelError>> {
        add_sender(&self.inner, cb)
    }

    /// Withdraws the last queued occurrence of `handle`. Idempotent if it
    /// already fired or was already removed.
    pub fn remove_sender(&self, handle: &SenderHandle<T>) {
        remove_sender(&self.inner, handle)
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<ChannelInner<T>>> {
        &self.inner
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.borrow_mut().num_senders += 1;
        Sender { inner: self.inner.clone() }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.borrow();
        f.debug_struct("Sender")
            .field("capacity", &guard.capacity)
            .field("open", &guard.open)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let should_close = {
            let mut guard = self.inner.borrow_mut();
            guard.num_senders -= 1;
            guard.num_senders == 0 && guard.open
        };
        if should_close {
            let _ = self.close();
        }
    }
}

fn close_channel<T>(inner: &Rc<RefCell<ChannelInner<T>>>) -> Result<(), Rc<ChannelError>> {
    let mut guard = inner.borrow_mut();
    if !guard.open {
        return Err(Rc::new(ChannelError::CloseOfClosedChannel));
    }
    guard.open = false;
    let closed_err = Rc::new(ChannelError::SendOnClosedChannel);
    let mut last_error: Option<Rc<ChannelError>> = None;

    if !guard.recv_queue.is_empty() {
        let receivers: Vec<_> = guard.recv_queue.drain(..).collect();
        let default_factory = guard.default_factory.clone();
        drop(guard);
        for recv in receivers {
            let default = default_factory.as_ref().map(|f| f());
            deliver_receiver(recv, default, false);
        }
        return Ok(());
    }

    // recv_queue was empty: flush queued senders into any remaining
    // buffer room before rejecting the rest (see design note on FIFO in
    // the face of errors — this recovers staged senders left over from a
    // receiver callback that threw mid-delivery).
    loop {
        if guard.buffer.is_full() {
            break;
        }
        let Some(sender) = guard.send_queue.pop_front() else { break };
        let Some(send_cb) = sender.callback.borrow_mut().take() else { continue };
        match send_cb(SendSignal::Ok) {
            Ok(value) => {
                guard.buffer.push(value).ok().expect("checked not full above");
            }
            Err(e) => {
                if !is_sentinel(&e, &closed_err) {
                    last_error = Some(e);
                }
            }
        }
    }

    let remaining: Vec<_> = guard.send_queue.drain(..).collect();
    drop(guard);
    for sender in remaining {
        if let Some(send_cb) = sender.callback.borrow_mut().take() {
            if let Err(e) = send_cb(SendSignal::Closed(closed_err.clone())) {
                if !is_sentinel(&e, &closed_err) {
                    last_error = Some(e);
                }
            }
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl<T> Receiver<T> {
    /// Non-blocking receive; never suspends.
    pub fn try_receive(&self) -> TryReceive<T> {
        let mut guard = self.inner.borrow_mut();
        if let Some(value) = guard.buffer.shift() {
            drain_senders_into_buffer(&mut guard);
            return TryReceive::Value(value);
        }
        if let Some(sender) = guard.send_queue.pop_front() {
            if let Some(send_cb) = sender.callback.borrow_mut().take() {
                drop(guard);
                match send_cb(SendSignal::Ok) {
                    Ok(value) => return TryReceive::Value(value),
                    Err(_) => return self.try_receive(),
                }
            }
            drop(guard);
            return self.try_receive();
        }
        if !guard.open {
            let default = guard.default_factory.as_ref().map(|f| f());
            return TryReceive::Closed(default);
        }
        TryReceive::Empty
    }

    /// Receives a value, suspending until one is available or the
    /// channel closes. Returns `(value, true)` or `(default, false)`.
    /// Yields to the next executor turn before returning unless a yield
    /// has already happened this turn (or unsafe mode is set).
    pub async fn receive(&self) -> (Option<T>, bool) {
        let yielder = yield_now::current();
        let baseline = yielder.generation();
        let result = ReceiveReady::new(self.inner.clone()).await;
        if !self.inner.borrow().unsafe_mode && yielder.generation() == baseline {
            yielder.yield_now().await;
        }
        result
    }

    /// Receives a value, racing against `cancel`.
    pub async fn receive_cancellable<E: Clone + 'static>(
        &self,
        cancel: crate::cancel::CancelToken<E>,
    ) -> Result<(Option<T>, bool), E>
    where
        T: 'static,
    {
        if let Some(reason) = cancel.peek() {
            return Err(reason);
        }
        let mut select = crate::select::Select::new();
        let recv_id = select.push_recv(self.clone());
        let winner = select.wait_cancellable(cancel).await?;
        debug_assert_eq!(winner, recv_id);
        Ok(select.take_result(recv_id))
    }

    /// Closes the channel, preventing further sends while leaving any
    /// buffered values drainable. See spec's close policy: queued
    /// receivers are notified `ok=false`; queued senders are either
    /// flushed into remaining buffer room or rejected.
    pub fn close(&self) -> Result<(), Rc<ChannelError>> {
        close_channel(&self.inner)
    }

    /// Maximum number of buffered values.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Number of values currently buffered.
    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    /// `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().buffer.is_empty()
    }

    pub fn concurrency(&self) -> isize {
        let guard = self.inner.borrow();
        guard.send_queue.len() as isize - guard.recv_queue.len() as isize
    }

    pub fn set_unsafe(&self, unsafe_mode: bool) {
        self.inner.borrow_mut().unsafe_mode = unsafe_mode;
    }

    /// Synchronously drains currently-buffered values without blocking.
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter::new(self)
    }

    /// Low-level registration used to build custom receive protocols
    /// (this is what [`Select`](crate::select::Select)'s receive case is
    /// built on top of). Delivers `cb` synchronously from the buffer, a
    /// waiting sender, or close state when possible; otherwise queues it
    /// and returns a handle for
    /// [`remove_receiver`](Receiver::remove_receiver).
    pub fn add_receiver(
        &self,
        cb: ReceiverCallback<T>,
    ) -> Result<AddOutcome<ReceiverHandle<T>>, Rc<ChannelError>> {
        add_receiver(&self.inner, cb)
    }

    /// Withdraws the last queued occurrence of `handle`. Idempotent if it
    /// already fired or was already removed.
    pub fn remove_receiver(&self, handle: &ReceiverHandle<T>) {
        remove_receiver(&self.inner, handle)
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<ChannelInner<T>>> {
        &self.inner
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver { inner: self.inner.clone() }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.borrow();
        f.debug_struct("Receiver")
            .field("capacity", &guard.capacity)
            .field("open", &guard.open)
            .field("buffered", &guard.buffer.len())
            .finish_non_exhaustive()
    }
}

fn drain_senders_into_buffer<T>(guard: &mut ChannelInner<T>) {
    loop {
        if guard.buffer.is_full() {
            break;
        }
        let Some(sender) = guard.send_queue.pop_front() else { break };
        let Some(send_cb) = sender.callback.borrow_mut().take() else { continue };
        if let Ok(value) = send_cb(SendSignal::Ok) {
            let _ = guard.buffer.push(value);
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let _ = self.close();
        let mut guard = self.inner.borrow_mut();
        guard.buffer.clear();
    }
}

impl<T> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self.try_receive() {
            TryReceive::Value(v) => Poll::Ready(Some(v)),
            TryReceive::Closed(_) => Poll::Ready(None),
            TryReceive::Empty => {
                let waker_slot = ResultSlot::<(Option<T>, bool)>::new(cx.waker().clone());
                let slot = waker_slot.clone();
                let cb: ReceiverCallback<T> = Box::new(move |value, ok| {
                    let mut slot = slot.borrow_mut();
                    let waker = slot.waker.take();
                    slot.value = Some((value, ok));
                    drop(slot);
                    if let Some(w) = waker {
                        w.wake();
                    }
                });
                match add_receiver(&self.inner, cb) {
                    Ok(AddOutcome::Inline) => {
                        let (value, ok) = waker_slot
                            .borrow_mut()
                            .value
                            .take()
                            .expect("inline registration must resolve the slot");
                        if ok {
                            Poll::Ready(value)
                        } else {
                            Poll::Ready(None)
                        }
                    }
                    Ok(AddOutcome::Enqueued(_)) => Poll::Pending,
                    Err(_) => Poll::Ready(None),
                }
            }
        }
    }
}

/// Leaf future behind [`Sender::send`]: enqueues once, resolves when the
/// channel's internal dispatch invokes the stored callback.
struct SendReady<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
    value: Option<T>,
    handle: Option<SenderHandle<T>>,
    slot: Option<Rc<RefCell<ResultSlot<Result<(), SendError>>>>>,
}

impl<T> SendReady<T> {
    fn new(inner: Rc<RefCell<ChannelInner<T>>>, value: T) -> Self {
        SendReady { inner, value: Some(value), handle: None, slot: None }
    }
}

impl<T> Future for SendReady<T> {
    type Output = Result<(), SendError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), SendError>> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            let mut guard = slot.borrow_mut();
            return match guard.value.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => {
                    guard.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            };
        }

        let slot = ResultSlot::<Result<(), SendError>>::new(cx.waker().clone());
        let slot_for_cb = slot.clone();
        let mut value = this.value.take();
        let cb: SenderCallback<T> = Box::new(move |signal| {
            let (outcome, produced) = match signal {
                SendSignal::Ok => {
                    let v = value.take().expect("sender callback invoked more than once");
                    (Ok(()), Ok(v))
                }
                SendSignal::Closed(e) => (Err(SendError::closed()), Err(e)),
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

        match add_sender(&this.inner, cb) {
            Ok(AddOutcome::Inline) => {
                let outcome = slot
                    .borrow_mut()
                    .value
                    .take()
                    .expect("inline registration must resolve the slot");
                Poll::Ready(outcome)
            }
            Ok(AddOutcome::Enqueued(handle)) => {
                this.handle = Some(handle);
                this.slot = Some(slot);
                Poll::Pending
            }
            Err(_) => Poll::Ready(Err(SendError::closed())),
        }
    }
}

impl<T> Drop for SendReady<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            remove_sender(&self.inner, handle);
        }
    }
}

/// Leaf future behind [`Receiver::receive`].
struct ReceiveReady<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
    handle: Option<ReceiverHandle<T>>,
    slot: Option<Rc<RefCell<ResultSlot<(Option<T>, bool)>>>>,
}

impl<T> ReceiveReady<T> {
    fn new(inner: Rc<RefCell<ChannelInner<T>>>) -> Self {
        ReceiveReady { inner, handle: None, slot: None }
    }
}

impl<T> Future for ReceiveReady<T> {
    type Output = (Option<T>, bool);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<(Option<T>, bool)> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            let mut guard = slot.borrow_mut();
            return match guard.value.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => {
                    guard.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            };
        }

        let slot = ResultSlot::<(Option<T>, bool)>::new(cx.waker().clone());
        let slot_for_cb = slot.clone();
        let cb: ReceiverCallback<T> = Box::new(move |value, ok| {
            let mut guard = slot_for_cb.borrow_mut();
            let waker = guard.waker.take();
            guard.value = Some((value, ok));
            drop(guard);
            if let Some(w) = waker {
                w.wake();
            }
        });

        match add_receiver(&this.inner, cb) {
            Ok(AddOutcome::Inline) => {
                let outcome = slot
                    .borrow_mut()
                    .value
                    .take()
                    .expect("inline registration must resolve the slot");
                Poll::Ready(outcome)
            }
            Ok(AddOutcome::Enqueued(handle)) => {
                this.handle = Some(handle);
                this.slot = Some(slot);
                Poll::Pending
            }
            Err(_) => {
                // A sender callback aborted mid-handoff; the receiver was
                // requeued by `add_receiver`. Treat as "not yet", poll
                // again next wake (the requeue itself doesn't wake us, so
                // nudge the executor ourselves).
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for ReceiveReady<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            remove_receiver(&self.inner, handle);
        }
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

    /// `send`/`receive` suspend once more than their core operation to
    /// yield to the next executor turn, so driving them to completion by
    /// hand takes an extra poll beyond the one that settles the value.
    fn poll_until_ready<F: Future + Unpin>(fut: &mut F, max_polls: usize) -> F::Output {
        for _ in 0..max_polls {
            if let Poll::Ready(v) = poll_once(fut) {
                return v;
            }
        }
        panic!("future did not resolve within {max_polls} polls");
    }

    #[test]
    fn try_send_then_try_receive_buffered() {
        let (tx, rx) = channel::<i32>(3);
        assert!(tx.try_send(10).is_ok());
        assert!(tx.try_send(20).is_ok());
        assert!(tx.try_send(30).is_ok());
        assert!(tx.try_send(40).is_err());

        match rx.try_receive() {
            TryReceive::Value(v) => assert_eq!(v, 10),
            _ => panic!("expected a value"),
        }
        match rx.try_receive() {
            TryReceive::Value(v) => assert_eq!(v, 20),
            _ => panic!("expected a value"),
        }
        assert!(tx.try_send(40).is_ok());
        match rx.try_receive() {
            TryReceive::Value(v) => assert_eq!(v, 30),
            _ => panic!("expected a value"),
        }
        match rx.try_receive() {
            TryReceive::Value(v) => assert_eq!(v, 40),
            _ => panic!("expected a value"),
        }
        assert!(matches!(rx.try_receive(), TryReceive::Empty));
    }

    #[test]
    fn unbuffered_try_send_fails_without_receiver() {
        let (tx, _rx) = channel::<i32>(0);
        assert!(tx.try_send(1).is_err());
    }

    #[test]
    fn try_send_hands_off_to_pending_receive_future() {
        let (tx, rx) = channel::<i32>(0);
        let mut recv_fut = Box::pin(rx.receive());
        assert_eq!(poll_once(&mut recv_fut), Poll::Pending);
        assert!(tx.try_send(42).is_ok());
        assert_eq!(poll_until_ready(&mut recv_fut, 5), (Some(42), true));
    }

    #[test]
    fn close_rejects_further_try_send() {
        let (tx, rx) = channel::<i32>(1);
        tx.close().unwrap();
        assert!(tx.try_send(1).is_err());
        assert!(matches!(rx.try_receive(), TryReceive::Closed(None)));
    }

    #[test]
    fn close_twice_errors() {
        let (tx, _rx) = channel::<i32>(1);
        tx.close().unwrap();
        assert!(matches!(*tx.close().unwrap_err(), ChannelError::CloseOfClosedChannel));
    }

    #[test]
    fn close_with_pending_senders_rejects_them() {
        let (tx, rx) = channel::<i32>(0);
        let mut send_fut = Box::pin(tx.send(7));
        assert_eq!(poll_once(&mut send_fut), Poll::Pending);
        rx.close().unwrap();
        let result = poll_until_ready(&mut send_fut, 5);
        match result {
            Err(e) => assert!(e.is_disconnected()),
            Ok(()) => panic!("expected a disconnected send error"),
        }
        assert!(matches!(rx.try_receive(), TryReceive::Closed(None)));
    }

    #[test]
    fn close_drains_buffer_before_reporting_closed() {
        let (tx, rx) = channel::<i32>(2);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        rx.close().unwrap();
        match rx.try_receive() {
            TryReceive::Value(1) => {}
            other => panic!("expected 1, got {:?}", other),
        }
        match rx.try_receive() {
            TryReceive::Value(2) => {}
            other => panic!("expected 2, got {:?}", other),
        }
        assert!(matches!(rx.try_receive(), TryReceive::Closed(None)));
    }

    #[test]
    fn default_factory_used_after_close() {
        let (tx, rx) = channel_with_default::<i32>(1, || -1);
        tx.close().unwrap();
        match rx.try_receive() {
            TryReceive::Closed(Some(-1)) => {}
            other => panic!("expected default, got {:?}", other),
        }
    }

    #[test]
    fn concurrency_reflects_pending_direction() {
        let (tx, rx) = channel::<i32>(0);
        assert_eq!(tx.concurrency(), 0);
        let mut send_fut = Box::pin(tx.send(1));
        assert_eq!(poll_once(&mut send_fut), Poll::Pending);
        assert_eq!(tx.concurrency(), 1);
        drop(send_fut);
        assert_eq!(tx.concurrency(), 0);
        let mut recv_fut = Box::pin(rx.receive());
        assert_eq!(poll_once(&mut recv_fut), Poll::Pending);
        assert_eq!(tx.concurrency(), -1);
    }

    #[test]
    fn dropping_last_sender_closes_channel() {
        let (tx, rx) = channel::<i32>(1);
        drop(tx);
        assert!(matches!(rx.try_receive(), TryReceive::Closed(None)));
    }

    #[test]
    fn sender_clone_keeps_channel_open_until_all_dropped() {
        let (tx, rx) = channel::<i32>(1);
        let tx2 = tx.clone();
        drop(tx);
        assert!(tx2.try_send(1).is_ok());
        drop(tx2);
        match rx.try_receive() {
            TryReceive::Value(1) => {}
            other => panic!("expected buffered value before close, got {:?}", other),
        }
        assert!(matches!(rx.try_receive(), TryReceive::Closed(None)));
    }
}
