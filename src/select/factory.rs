//! Reuses one [`Select`] across many loop iterations instead of
//! rebuilding its case list every time — the natural shape of a
//! dispatch loop that keeps selecting over the same fixed channels.
//!
//! A receive case is already safe to poll over and over (it never
//! consumes anything the case itself owns), but a send case owns the
//! one value it was built with; `SelectFactory` is what lets a send case
//! be "re-armed" with a freshly produced value before each `wait` rather
//! than thrown away and rebuilt.

use std::any::Any;
use std::fmt;
use std::future::Future;

use crate::channel::{Receiver, Sender};

use super::case::SendCase;
use super::{CaseId, Select};

/// A `Select` plus a set of value suppliers that re-arm its send cases
/// before every [`wait`](SelectFactory::wait).
pub struct SelectFactory {
    select: Select,
    recharge: Vec<(CaseId, Box<dyn FnMut(&mut Select)>)>,
}

impl SelectFactory {
    pub fn new() -> Self {
        SelectFactory { select: Select::new(), recharge: Vec::new() }
    }

    /// Adds a receive case. Safe to poll indefinitely without rearming.
    pub fn push_recv<T: 'static>(&mut self, receiver: Receiver<T>) -> CaseId {
        self.select.push_recv(receiver)
    }

    /// Adds an externally-driven case (e.g. a fresh timer or
    /// cancellation future produced by `next`) that is rebuilt from
    /// scratch on every `wait`.
    pub fn push_external<F>(&mut self, mut next: impl FnMut() -> F + 'static) -> CaseId
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let id = self.select.push_external(next());
        self.recharge.push((
            id,
            Box::new(move |select: &mut Select| {
                select.recharge_external(id, next());
            }),
        ));
        id
    }

    /// Adds a send case whose value is produced anew by `next_value`
    /// immediately before every `wait`.
    pub fn push_send<T: 'static>(
        &mut self,
        sender: Sender<T>,
        mut next_value: impl FnMut() -> T + 'static,
    ) -> CaseId {
        let id = self.select.push_send(sender.clone(), next_value());
        self.recharge.push((
            id,
            Box::new(move |select: &mut Select| {
                select.recharge_send::<T>(id, next_value());
            }),
        ));
        id
    }

    /// Suspends until one case is ready, recharging every send/external
    /// case that carries a supplier closure right beforehand.
    pub async fn wait(&mut self) -> CaseId {
        let select = &mut self.select;
        for (_, recharge) in &mut self.recharge {
            recharge(select);
        }
        self.select.wait().await
    }

    pub fn take_result<R: 'static>(&mut self, id: CaseId) -> R {
        self.select.take_result(id)
    }

    pub fn set_unsafe(&mut self, unsafe_mode: bool) {
        self.select.set_unsafe(unsafe_mode);
    }
}

impl Default for SelectFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SelectFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectFactory")
            .field("select", &self.select)
            .field("recharged_cases", &self.recharge.len())
            .finish()
    }
}

impl Select {
    pub(crate) fn recharge_send<T: 'static>(&mut self, id: CaseId, value: T) {
        let case = self.case_mut(id).as_any_mut();
        case.downcast_mut::<SendCase<T>>()
            .expect("recharge_send called with a CaseId that is not a send case of type T")
            .reset(value);
    }

    pub(crate) fn recharge_external<F>(&mut self, id: CaseId, future: F)
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let case = self.case_mut(id);
        *case = Box::new(super::case::ExternalCase::new(future));
        // A prior `wait` may have consumed and spliced this index out of
        // the pending set (external cases are terminal once taken); the
        // fresh case just swapped in needs to be back in the scan.
        if !self.order.contains(&id.index) {
            self.order.push(id.index);
        }
    }

    fn case_mut(&mut self, id: CaseId) -> &mut Box<dyn super::case::SelectCase> {
        self.check_owner(id);
        &mut self.cases_mut()[id.index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use futures_util::task::noop_waker_ref;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn poll_once<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(noop_waker_ref());
        Pin::new(fut).poll(&mut cx)
    }

    #[test]
    fn reused_send_case_gets_a_fresh_value_each_wait() {
        let (tx, rx) = channel::<i32>(1);
        let mut n = 0;
        let mut factory = SelectFactory::new();
        factory.set_unsafe(true);
        let send_id = factory.push_send(tx, move || {
            n += 1;
            n
        });

        let mut wait_fut = Box::pin(factory.wait());
        assert_eq!(poll_once(&mut wait_fut), Poll::Ready(send_id));
        drop(wait_fut);
        assert!(matches!(rx.try_receive(), crate::channel::TryReceive::Value(1)));

        let mut wait_fut2 = Box::pin(factory.wait());
        assert_eq!(poll_once(&mut wait_fut2), Poll::Ready(send_id));
        drop(wait_fut2);
        assert!(matches!(rx.try_receive(), crate::channel::TryReceive::Value(2)));
    }

    #[test]
    fn reused_external_case_is_considered_again_after_being_consumed() {
        let mut n = 0;
        let mut factory = SelectFactory::new();
        factory.set_unsafe(true);
        let ext_id = factory.push_external(move || {
            n += 1;
            std::future::ready(n)
        });

        let mut wait_fut = Box::pin(factory.wait());
        assert_eq!(poll_once(&mut wait_fut), Poll::Ready(ext_id));
        drop(wait_fut);
        let value: i32 = factory.take_result(ext_id);
        assert_eq!(value, 1);

        // The first win spliced this case out of the pending set; a
        // second `wait` must still find it, freshly recharged.
        let mut wait_fut2 = Box::pin(factory.wait());
        assert_eq!(poll_once(&mut wait_fut2), Poll::Ready(ext_id));
        drop(wait_fut2);
        let value2: i32 = factory.take_result(ext_id);
        assert_eq!(value2, 2);
    }
}
