//! `Select` over a mix of an always-closed receive case, an
//! already-resolved external future, a case that never becomes ready,
//! and (in the second test) a case that only becomes ready after a
//! real suspend/wake round trip.

use std::cell::RefCell;
use std::future::ready;
use std::rc::Rc;

use chansel::channel::channel;
use chansel::select::Select;
use futures_executor::LocalPool;
use futures_util::task::LocalSpawnExt;

#[test]
fn select_picks_among_a_mixed_case_set() {
    let (_tx_idle, rx_idle) = channel::<i32>(0); // never becomes ready
    let (tx_closed, rx_closed) = channel::<i32>(0);
    tx_closed.close().unwrap();

    let mut select = Select::new();
    select.set_unsafe(true);
    let idle_id = select.push_recv(rx_idle);
    let closed_id = select.push_recv(rx_closed);
    let ready_id = select.push_external(ready(99_u32));

    let winner = select.poll_once().expect("a ready case exists");
    assert_ne!(winner, idle_id);
    assert!(winner == closed_id || winner == ready_id);

    if winner == closed_id {
        let (value, ok): (Option<i32>, bool) = select.take_result(closed_id);
        assert_eq!((value, ok), (None, false));
    } else {
        let value: u32 = select.take_result(ready_id);
        assert_eq!(value, 99);
    }
}

#[test]
fn consumed_external_case_is_not_considered_by_a_later_selection() {
    let (_tx_idle, rx_idle) = channel::<i32>(0); // never becomes ready
    let mut select = Select::new();
    select.set_unsafe(true);
    let idle_id = select.push_recv(rx_idle);
    let ready_id = select.push_external(ready(42_u32));

    let winner = select.poll_once().expect("the external case is ready");
    assert_eq!(winner, ready_id);
    let value: u32 = select.take_result(ready_id);
    assert_eq!(value, 42);

    // The external case is terminal once observed: a second selection on
    // the same `Select` must no longer poll its (already-resolved) future,
    // and with nothing else ready, finds nothing.
    assert_eq!(select.poll_once(), None);
    let _ = idle_id;
}

#[test]
fn select_wait_resolves_once_a_delayed_case_becomes_ready() {
    let (tx, rx) = channel::<i32>(0);
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    let winner_slot = Rc::new(RefCell::new(None));
    let winner_slot_clone = winner_slot.clone();

    spawner
        .spawn_local(async move {
            let mut select = Select::new();
            let recv_id = select.push_recv(rx);
            let winner = select.wait().await;
            assert_eq!(winner, recv_id);
            let result: (Option<i32>, bool) = select.take_result(recv_id);
            *winner_slot_clone.borrow_mut() = Some(result);
        })
        .unwrap();
    spawner
        .spawn_local(async move {
            tx.send(5).await.unwrap();
        })
        .unwrap();

    pool.run();
    assert_eq!(*winner_slot.borrow(), Some((Some(5), true)));
}
