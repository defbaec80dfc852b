//! Synchronous drain adapter behind [`Receiver::try_iter`](super::Receiver::try_iter).

use super::{Receiver, TryReceive};

/// Iterator over the values currently buffered (or directly available
/// from a waiting sender) on a [`Receiver`], stopping — without
/// blocking — the moment nothing more is immediately ready.
pub struct TryIter<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<'a, T> std::fmt::Debug for TryIter<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TryIter").finish_non_exhaustive()
    }
}

impl<'a, T> TryIter<'a, T> {
    pub(super) fn new(receiver: &'a Receiver<T>) -> Self {
        TryIter { receiver }
    }
}

impl<'a, T> Iterator for TryIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.receiver.try_receive() {
            TryReceive::Value(v) => Some(v),
            TryReceive::Closed(_) | TryReceive::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel;

    #[test]
    fn drains_only_currently_buffered_values() {
        let (tx, rx) = channel::<i32>(4);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        tx.try_send(3).unwrap();
        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn stops_without_blocking_on_closed_channel() {
        let (tx, rx) = channel::<i32>(4);
        tx.try_send(1).unwrap();
        tx.close().unwrap();
        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(drained, vec![1]);
        assert!(rx.try_iter().next().is_none());
    }
}
