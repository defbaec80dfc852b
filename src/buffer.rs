//! Fixed-capacity ring buffer backing a [`Channel`](crate::channel::Channel)'s
//! staged values.

/// A fixed-capacity FIFO ring buffer.
///
/// `push`/`shift` run in O(1); wrap-around never reorders elements.
#[derive(Debug)]
pub(crate) struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> CircularBuffer<T> {
    /// Creates a buffer that holds at most `capacity` items. A `capacity`
    /// of zero is a valid, permanently-full-and-empty buffer.
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        CircularBuffer { slots, head: 0, len: 0 }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Inserts `value` at the tail. Fails (returning `value` back) if the
    /// buffer is full.
    pub(crate) fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let cap = self.slots.len();
        let tail = (self.head + self.len) % cap;
        self.slots[tail] = Some(value);
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the oldest item, if any.
    pub(crate) fn shift(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let cap = self.slots.len();
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % cap;
        self.len -= 1;
        value
    }

    /// Read-only look at the oldest item without removing it.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    /// Zeroes head/len without touching the stored slots. Only sound to
    /// call when the caller already knows the slots are logically gone
    /// (e.g. they were moved out); use [`clear`](Self::clear) otherwise.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn reset(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Like [`reset`](Self::reset) but also overwrites every stored slot
    /// with `None`, releasing any references the buffer held.
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_under_wraparound() {
        let mut buf = CircularBuffer::new(3);
        assert!(buf.push(1).is_ok());
        assert!(buf.push(2).is_ok());
        assert!(buf.push(3).is_ok());
        assert!(buf.push(4).is_err());

        assert_eq!(buf.shift(), Some(1));
        assert_eq!(buf.shift(), Some(2));
        assert!(buf.push(4).is_ok());
        assert!(buf.push(5).is_ok());
        assert_eq!(buf.shift(), Some(3));
        assert_eq!(buf.shift(), Some(4));
        assert_eq!(buf.shift(), Some(5));
        assert_eq!(buf.shift(), None);
    }

    #[test]
    fn zero_capacity_is_always_full_and_empty() {
        let mut buf: CircularBuffer<u32> = CircularBuffer::new(0);
        assert!(buf.is_empty());
        assert!(buf.is_full());
        assert!(buf.push(1).is_err());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut buf = CircularBuffer::new(2);
        buf.push(10).unwrap();
        assert_eq!(buf.peek(), Some(&10));
        assert_eq!(buf.peek(), Some(&10));
        assert_eq!(buf.shift(), Some(10));
    }

    #[test]
    fn clear_drops_stored_values() {
        use std::rc::Rc;
        let mut buf = CircularBuffer::new(2);
        let rc = Rc::new(());
        buf.push(rc.clone()).unwrap();
        assert_eq!(Rc::strong_count(&rc), 2);
        buf.clear();
        assert_eq!(Rc::strong_count(&rc), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn len_and_capacity() {
        let mut buf = CircularBuffer::new(4);
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.len(), 0);
        buf.push(1).unwrap();
        buf.push(2).unwrap();
        assert_eq!(buf.len(), 2);
    }
}
