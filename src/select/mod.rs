//! A fair multiplexer over a heterogeneous set of channel sends, channel
//! receives, and arbitrary futures.
//!
//! Where Go's runtime shuffles a `pollorder` array of channel pointers
//! and walks it once, `Select` shuffles a `Vec<usize>` of indices into
//! its own `Vec<Box<dyn SelectCase>>` — one [`SelectCase`](case::SelectCase)
//! per arm, type-erased because Rust cannot store a structurally-typed,
//! heterogeneous case list the way the source model does.

mod case;
mod factory;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cancel::CancelToken;
use crate::channel::{Receiver, Sender};
use crate::yield_now;

pub use factory::SelectFactory;

use case::SelectCase;

/// A handle to a case registered with a [`Select`], returned by
/// `push_send`/`push_recv`/`push_external` and accepted by `wait`'s
/// result accessors.
///
/// Tagged with the id of the `Select` that minted it: a case registered
/// with one at most one `Select` for its lifetime, so presenting it to a
/// different `Select` is a protocol misuse and panics rather than
/// silently indexing the wrong case (spec.md §7's internal-consistency
/// `ProtocolMisuse` kind, realized here as a fatal assertion in the same
/// style as this crate's other `.expect()`-guarded invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseId {
    select_id: u64,
    index: usize,
}

thread_local! {
    static NEXT_SELECT_ID: std::cell::Cell<u64> = std::cell::Cell::new(0);
}

fn next_select_id() -> u64 {
    NEXT_SELECT_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        id
    })
}

/// A reusable, fair multiplexer. Cases are added with `push_send`,
/// `push_recv`, and `push_external`; `wait` suspends until one becomes
/// ready, chosen uniformly at random among every case that is ready in
/// the same turn.
pub struct Select {
    id: u64,
    cases: Vec<Box<dyn SelectCase>>,
    order: Vec<usize>,
    rng: StdRng,
    unsafe_mode: bool,
}

impl Select {
    /// Creates an empty `Select`. Cases can be pushed any time no `wait`
    /// is in progress.
    pub fn new() -> Self {
        Select {
            id: next_select_id(),
            cases: Vec::new(),
            order: Vec::new(),
            rng: StdRng::from_entropy(),
            unsafe_mode: false,
        }
    }

    /// Creates an empty `Select` whose reshuffles are driven by a PRNG
    /// seeded from `seed` instead of OS entropy. Intended for fairness
    /// tests that need reproducible runs (spec's "deterministic PRNG for
    /// testing fairness").
    pub fn seeded(seed: u64) -> Self {
        Select {
            id: next_select_id(),
            cases: Vec::new(),
            order: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            unsafe_mode: false,
        }
    }

    /// Panics if `id` was not minted by this `Select` — the Rust analogue
    /// of spec.md §7's `ProtocolMisuse`/"invalid case index".
    fn check_owner(&self, id: CaseId) {
        assert_eq!(
            id.select_id, self.id,
            "CaseId belongs to a different Select; a case may be registered with at most one Select"
        );
    }

    /// Adds a send case: when this case wins, `value` has already been
    /// delivered or buffered.
    pub fn push_send<T: 'static>(&mut self, sender: Sender<T>, value: T) -> CaseId {
        self.push(Box::new(case::SendCase::new(sender, value)))
    }

    /// Adds a receive case.
    pub fn push_recv<T: 'static>(&mut self, receiver: Receiver<T>) -> CaseId {
        self.push(Box::new(case::RecvCase::new(receiver)))
    }

    /// Adds a case that wins when an arbitrary future resolves — most
    /// often a [`CancelToken`](crate::cancel::CancelToken), but any
    /// `Future` works.
    pub fn push_external<F>(&mut self, future: F) -> CaseId
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.push(Box::new(case::ExternalCase::new(future)))
    }

    fn push(&mut self, case: Box<dyn SelectCase>) -> CaseId {
        let id = CaseId { select_id: self.id, index: self.cases.len() };
        self.cases.push(case);
        self.order.push(id.index);
        id
    }

    fn cases_mut(&mut self) -> &mut Vec<Box<dyn SelectCase>> {
        &mut self.cases
    }

    fn pop_case(&mut self, id: CaseId) {
        self.check_owner(id);
        assert_eq!(
            id.index,
            self.cases.len() - 1,
            "pop_case only supports removing the most recently pushed case"
        );
        self.cases.pop();
        self.order.retain(|&i| i != id.index);
    }

    /// Number of cases currently registered.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// `true` if no cases are registered.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Disables the per-call macrotask yield. Intended for benchmarks.
    pub fn set_unsafe(&mut self, unsafe_mode: bool) {
        self.unsafe_mode = unsafe_mode;
    }

    fn reshuffle(&mut self) {
        let len = self.order.len();
        for i in (1..len).rev() {
            let j = self.rng.gen_range(0..=i);
            self.order.swap(i, j);
        }
    }

    fn withdraw_all_except(&mut self, winner: usize) {
        for &i in &self.order {
            if i != winner {
                self.cases[i].withdraw();
            }
        }
    }

    /// Checks every case once, without suspending. Returns the winner if
    /// one (or more — picked uniformly at random) is immediately ready.
    pub fn poll_once(&mut self) -> Option<CaseId> {
        self.reshuffle();
        let order = self.order.clone();
        for i in order {
            if self.cases[i].try_ready() {
                self.withdraw_all_except(i);
                return Some(CaseId { select_id: self.id, index: i });
            }
        }
        None
    }

    /// Suspends until one case is ready, yielding to the next executor
    /// turn before returning unless a yield already happened this turn.
    pub async fn wait(&mut self) -> CaseId {
        let yielder = yield_now::current();
        let baseline = yielder.generation();
        let id = Wait { select: self, started: false }.await;
        if !self.unsafe_mode && yielder.generation() == baseline {
            yielder.yield_now().await;
        }
        id
    }

    /// Like `wait`, but also races a cancellation handle. If `cancel`
    /// fires first, every case's pending registration is withdrawn and
    /// `Err(reason)` is returned; the temporary cancellation case is
    /// removed either way, leaving `self` exactly as it was.
    pub async fn wait_cancellable<E: Clone + 'static>(
        &mut self,
        cancel: CancelToken<E>,
    ) -> Result<CaseId, E> {
        if let Some(reason) = cancel.peek() {
            return Err(reason);
        }
        let cancel_id = self.push_external(cancel);
        let winner = self.wait().await;
        if winner == cancel_id {
            let reason = self.take_result::<E>(winner);
            self.pop_case(cancel_id);
            Err(reason)
        } else {
            self.pop_case(cancel_id);
            Ok(winner)
        }
    }

    /// Recovers the value a winning case resolved to. `R` must match the
    /// type the case was constructed with (`Result<(), SendError>` for a
    /// send case, `(Option<T>, bool)` for a receive case, or the
    /// future's own `Output` for an external case) — panics otherwise.
    ///
    /// Channel cases stay registered and reusable across future `wait`
    /// calls. An external-value case is different: per spec.md §3.2 it
    /// is terminal once observed, so consuming it here also splices its
    /// index out of the pending set — a later `wait`/`poll_once` on this
    /// `Select` will never consider it again.
    pub fn take_result<R: 'static>(&mut self, id: CaseId) -> R {
        self.check_owner(id);
        let case = &mut self.cases[id.index];
        let boxed = case.take_result();
        if case.removed_after_take() {
            self.order.retain(|&i| i != id.index);
        }
        *boxed.downcast::<R>().expect("case result type does not match the case's declared kind")
    }
}

impl Default for Select {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("cases", &self.cases.len())
            .field("unsafe_mode", &self.unsafe_mode)
            .finish_non_exhaustive()
    }
}

struct Wait<'a> {
    select: &'a mut Select,
    started: bool,
}

impl<'a> Future for Wait<'a> {
    type Output = CaseId;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CaseId> {
        let this = self.get_mut();
        let select = &mut *this.select;

        if !this.started {
            this.started = true;
            select.reshuffle();

            let order = select.order.clone();
            for i in order.iter().copied() {
                if select.cases[i].try_ready() {
                    select.withdraw_all_except(i);
                    return Poll::Ready(CaseId { select_id: select.id, index: i });
                }
            }

            let waker = cx.waker().clone();
            for i in order {
                select.cases[i].register(&waker);
            }
            // A future case can resolve synchronously during `register`
            // (its first real poll); check once more before truly
            // suspending.
            let order = select.order.clone();
            for i in order {
                if select.cases[i].poll_registered(&waker) {
                    select.withdraw_all_except(i);
                    return Poll::Ready(CaseId { select_id: select.id, index: i });
                }
            }
            return Poll::Pending;
        }

        let waker = cx.waker().clone();
        let order = select.order.clone();
        for i in order {
            if select.cases[i].poll_registered(&waker) {
                select.withdraw_all_except(i);
                return Poll::Ready(CaseId { select_id: select.id, index: i });
            }
        }
        Poll::Pending
    }
}
