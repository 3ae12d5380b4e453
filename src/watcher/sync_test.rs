use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::*;

#[test]
fn tick_polls_only_when_idle() {
    let mut sync = SyncController::new();

    assert_eq!(sync.on_tick(), Some(0));
    assert_eq!(sync.on_tick(), None);

    assert_eq!(sync.on_cycle_complete(0), None);
    assert_eq!(sync.on_tick(), Some(1));
    assert_eq!(sync.polls_issued(), 2);
}

#[test]
fn sync_while_idle_polls_immediately() {
    let mut sync = SyncController::new();
    let (tx, mut rx) = oneshot::channel();

    assert_eq!(sync.on_sync(tx), Some(0));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    assert_eq!(sync.on_cycle_complete(0), None);
    assert_eq!(rx.try_recv(), Ok(()));
    assert_eq!(sync.waiting(), 0);
}

#[test]
fn sync_during_running_poll_waits_for_a_later_cycle() {
    let mut sync = SyncController::new();
    assert_eq!(sync.on_tick(), Some(0));

    let (tx, mut rx) = oneshot::channel();
    assert_eq!(sync.on_sync(tx), None);

    // The running cycle started before the request; a fresh one is issued
    assert_eq!(sync.on_cycle_complete(0), Some(1));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    assert_eq!(sync.on_cycle_complete(1), None);
    assert_eq!(rx.try_recv(), Ok(()));
}

#[test]
fn concurrent_syncs_share_one_cycle() {
    let mut sync = SyncController::new();
    let (tx1, mut rx1) = oneshot::channel();
    let (tx2, mut rx2) = oneshot::channel();

    assert_eq!(sync.on_sync(tx1), Some(0));
    assert_eq!(sync.on_sync(tx2), None);

    // Second waiter needs a cycle issued after it arrived
    assert_eq!(sync.on_cycle_complete(0), Some(1));
    assert_eq!(rx1.try_recv(), Ok(()));
    assert_eq!(rx2.try_recv(), Err(TryRecvError::Empty));

    sync.on_cycle_complete(1);
    assert_eq!(rx2.try_recv(), Ok(()));
}

#[test]
fn aborted_cycle_keeps_waiters_until_next_success() {
    let mut sync = SyncController::new();
    let (tx, mut rx) = oneshot::channel();
    assert_eq!(sync.on_sync(tx), Some(0));

    sync.on_cycle_aborted(0);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(sync.waiting(), 1);

    assert_eq!(sync.on_tick(), Some(1));
    sync.on_cycle_complete(1);
    assert_eq!(rx.try_recv(), Ok(()));
}

#[test]
fn fail_all_closes_waiters() {
    let mut sync = SyncController::new();
    let (tx, mut rx) = oneshot::channel();
    sync.on_sync(tx);

    sync.fail_all();
    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[test]
fn cancelled_poll_frees_the_slot() {
    let mut sync = SyncController::new();
    assert_eq!(sync.on_tick(), Some(0));
    sync.cancel(0);
    assert_eq!(sync.on_tick(), Some(1));
}
