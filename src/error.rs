//! Error taxonomy for channels and select.
//!
//! Mirrors the shape of `futures_channel::mpsc`'s `SendError`/`TrySendError`:
//! a private `*Kind` enum behind a public struct, with predicate methods
//! instead of matchable variants, so new kinds can be added without an
//! API break.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

/// The two named failure kinds a [`Channel`](crate::channel::Channel) can
/// report on its own (as opposed to a cancellation reason, which is
/// supplied by the caller and propagated unchanged).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// A sender was registered, or a queued sender was flushed, after the
    /// channel was closed.
    SendOnClosedChannel,
    /// `close` was called on a channel that was already closed.
    CloseOfClosedChannel,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::SendOnClosedChannel => write!(f, "send on closed channel"),
            ChannelError::CloseOfClosedChannel => write!(f, "close of closed channel"),
        }
    }
}

impl Error for ChannelError {}

/// The error returned by [`Channel::send`](crate::channel::Sender::send).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendError {
    kind: SendErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum SendErrorKind {
    Closed,
    Cancelled,
}

impl SendError {
    pub(crate) fn closed() -> Self {
        SendError { kind: SendErrorKind::Closed }
    }

    pub(crate) fn cancelled() -> Self {
        SendError { kind: SendErrorKind::Cancelled }
    }

    /// Returns true if the send failed because the channel is closed.
    pub fn is_disconnected(&self) -> bool {
        matches!(self.kind, SendErrorKind::Closed)
    }

    /// Returns true if the send was aborted by a cancellation handle.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, SendErrorKind::Cancelled)
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SendErrorKind::Closed => write!(f, "send failed because channel is closed"),
            SendErrorKind::Cancelled => write!(f, "send was cancelled"),
        }
    }
}

impl Error for SendError {}

/// The error returned by [`Sender::try_send`](crate::channel::Sender::try_send).
#[derive(Clone, PartialEq, Eq)]
pub struct TrySendError<T> {
    kind: TrySendErrorKind,
    val: T,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TrySendErrorKind {
    Full,
    Closed,
}

impl<T> TrySendError<T> {
    pub(crate) fn full(val: T) -> Self {
        TrySendError { kind: TrySendErrorKind::Full, val }
    }

    pub(crate) fn closed(val: T) -> Self {
        TrySendError { kind: TrySendErrorKind::Closed, val }
    }

    /// Returns true if this error is a result of the channel having no
    /// waiting receiver and no free buffer slot.
    pub fn is_full(&self) -> bool {
        matches!(self.kind, TrySendErrorKind::Full)
    }

    /// Returns true if this error is a result of the channel being closed.
    pub fn is_disconnected(&self) -> bool {
        matches!(self.kind, TrySendErrorKind::Closed)
    }

    /// Recovers the message that failed to send.
    pub fn into_inner(self) -> T {
        self.val
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrySendError").field("kind", &self.kind).finish()
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TrySendErrorKind::Full => write!(f, "send failed because channel is full"),
            TrySendErrorKind::Closed => write!(f, "send failed because channel is closed"),
        }
    }
}

impl<T: fmt::Debug> Error for TrySendError<T> {}

/// Returns `true` when `err` is the exact same allocation as `sentinel`,
/// i.e. a sender callback re-threw the very error it was handed rather
/// than raising a new one. Identity, not value equality, is what makes
/// this a sentinel: see the Open Question in the design notes.
pub(crate) fn is_sentinel(err: &Rc<ChannelError>, sentinel: &Rc<ChannelError>) -> bool {
    Rc::ptr_eq(err, sentinel)
}
