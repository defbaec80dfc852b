//! Go-style buffered channels and a fair `select` multiplexer for
//! single-threaded cooperative async runtimes.
//!
//! [`channel`](channel::channel) creates a bounded (or rendezvous,
//! capacity `0`) FIFO channel whose [`Sender`](channel::Sender) and
//! [`Receiver`](channel::Receiver) halves suspend the calling task
//! instead of blocking a thread. [`select::Select`] multiplexes a
//! heterogeneous set of sends, receives, and arbitrary futures, picking
//! uniformly at random among whichever are ready in a given turn — the
//! same fairness guarantee Go's `select` gives its case list.
//!
//! Everything here is built on `Rc`/`RefCell`, not `Arc`/`Mutex`: there
//! is exactly one thread driving the executor, so there is nothing to
//! synchronize across.
//!
//! ```
//! use chansel::channel::channel;
//!
//! # futures_executor::block_on(async {
//! let (tx, rx) = channel::<u32>(1);
//! tx.send(7).await.unwrap();
//! assert_eq!(rx.receive().await, (Some(7), true));
//! # });
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod cancel;
pub mod channel;
pub mod error;
pub mod select;

mod buffer;
mod yield_now;

pub use cancel::{cancellation, CancelSource, CancelToken};
pub use channel::{channel, channel_with_default, Receiver, Sender, TryReceive};
pub use select::{CaseId, Select, SelectFactory};
pub use yield_now::{yield_generation, yield_to_macrotask};
