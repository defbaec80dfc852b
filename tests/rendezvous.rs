//! Two cooperative tasks handing a single value across an unbuffered
//! channel, driven by a real (single-threaded) executor rather than a
//! hand-stepped `Waker`.

use std::cell::RefCell;
use std::rc::Rc;

use chansel::channel::channel;
use futures_executor::LocalPool;
use futures_util::task::LocalSpawnExt;

#[test]
fn unbuffered_rendezvous_hands_off_directly() {
    let (tx, rx) = channel::<i32>(0);
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    let received = Rc::new(RefCell::new(None));
    let received_clone = received.clone();
    spawner
        .spawn_local(async move {
            *received_clone.borrow_mut() = Some(rx.receive().await);
        })
        .unwrap();
    spawner
        .spawn_local(async move {
            tx.send(99).await.unwrap();
        })
        .unwrap();

    pool.run();
    assert_eq!(*received.borrow(), Some((Some(99), true)));
}

#[test]
fn buffered_channel_refills_as_consumer_drains() {
    let (tx, rx) = channel::<i32>(3);
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    let collected = Rc::new(RefCell::new(Vec::new()));
    let collected_clone = collected.clone();

    spawner
        .spawn_local(async move {
            for i in 0..10 {
                tx.send(i).await.unwrap();
            }
        })
        .unwrap();
    spawner
        .spawn_local(async move {
            for _ in 0..10 {
                let (value, ok) = rx.receive().await;
                assert!(ok);
                collected_clone.borrow_mut().push(value.unwrap());
            }
        })
        .unwrap();

    pool.run();
    assert_eq!(*collected.borrow(), (0..10).collect::<Vec<_>>());
}

#[test]
fn closing_mid_flight_rejects_the_still_queued_sender() {
    let (tx, rx) = channel::<i32>(0);
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();

    let first_outcome = Rc::new(RefCell::new(None));
    let second_outcome = Rc::new(RefCell::new(None));

    let tx1 = tx.clone();
    let first_outcome_clone = first_outcome.clone();
    spawner
        .spawn_local(async move {
            *first_outcome_clone.borrow_mut() = Some(tx1.send(1).await);
        })
        .unwrap();

    let second_outcome_clone = second_outcome.clone();
    spawner
        .spawn_local(async move {
            *second_outcome_clone.borrow_mut() = Some(tx.send(2).await);
        })
        .unwrap();

    spawner
        .spawn_local(async move {
            let (value, ok) = rx.receive().await;
            assert_eq!((value, ok), (Some(1), true));
            rx.close().unwrap();
        })
        .unwrap();

    pool.run();

    assert!(first_outcome.borrow().as_ref().unwrap().is_ok());
    let second = second_outcome.borrow();
    let err = second.as_ref().unwrap().as_ref().unwrap_err();
    assert!(err.is_disconnected());
}
