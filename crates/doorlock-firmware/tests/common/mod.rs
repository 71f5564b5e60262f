//! Shared helpers for firmware integration tests.
//!
//! Every test runs on a paused tokio clock. The lock is driven with
//! `run_until`, which returns once the main loop is back in deep sleep past
//! the deadline; scripted card movements that must happen while the lock is
//! busy run in a spawned task.

#![allow(dead_code)]

use std::time::Duration;

use doorlock_cardman::DatabaseLayout;
use doorlock_core::{CardUid, FirmwareConfig};
use doorlock_firmware::{Device, MainState, MainStateMachine, RunOutcome, boot};
use doorlock_hardware::{BoardHandle, MockBoard, mock::MemoryPageStore};
use tokio::time::{Instant, sleep};

pub type Lock = MainStateMachine<MockBoard>;

pub mod cards {
    use doorlock_core::CardUid;

    pub const PROGRAMMING: CardUid = CardUid::from_array([0x04, 0xa0, 0x5f, 0x12, 0x9c, 0x3b, 0x80]);
    pub const KEY_1: CardUid = CardUid::from_array([0x3a, 0x91, 0x0c, 0x55]);
    pub const KEY_2: CardUid = CardUid::from_array([0x3a, 0x91, 0x0c, 0x56]);
    pub const STRANGER: CardUid = CardUid::from_array([0x8e, 0x11, 0x27, 0x40]);
}

pub fn store() -> MemoryPageStore {
    MemoryPageStore::new(32, 64)
}

/// Boot a lock on `store`, let `configure` adjust the database before the
/// first pass, and run it into deep sleep.
pub async fn start_on(
    store: MemoryPageStore,
    configure: impl FnOnce(&mut Device<MockBoard>),
) -> (Lock, BoardHandle) {
    start_with(store, FirmwareConfig::default(), configure).await
}

/// Like [`start_on`], with a non-default firmware configuration.
pub async fn start_with(
    store: MemoryPageStore,
    config: FirmwareConfig,
    configure: impl FnOnce(&mut Device<MockBoard>),
) -> (Lock, BoardHandle) {
    let (peripherals, handle) = MockBoard::build(store, config.door_guard_delay());
    let mut lock = boot(peripherals, DatabaseLayout::default(), config)
        .await
        .expect("boot");
    configure(lock.device_mut());
    assert_eq!(run_for(&mut lock, 1_000).await, RunOutcome::DeadlineReached);
    assert_eq!(lock.state(), MainState::DeepSleep);
    (lock, handle)
}

pub async fn start(configure: impl FnOnce(&mut Device<MockBoard>)) -> (Lock, BoardHandle) {
    start_on(store(), configure).await
}

/// Run the lock for `ms` milliseconds of simulated time.
pub async fn run_for(lock: &mut Lock, ms: u64) -> RunOutcome {
    let deadline = Instant::now() + Duration::from_millis(ms);
    lock.run_until(deadline).await.expect("main loop")
}

/// Present `card` for `hold_ms`, then take it away. Runs in the background.
pub fn tap(handle: &BoardHandle, card: CardUid, after_ms: u64, hold_ms: u64) {
    let rfid = handle.rfid.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(after_ms)).await;
        rfid.present(card);
        sleep(Duration::from_millis(hold_ms)).await;
        rfid.remove(&card);
    });
}

/// Close the door once the monitor accepts the edge.
pub async fn close_door(lock: &mut Lock, handle: &BoardHandle) {
    lock.device().door.settle().await;
    handle.door.close();
    run_for(lock, 500).await;
}

/// Whether the history contains the `from -> to` transition.
pub fn passed(lock: &Lock, from: MainState, to: MainState) -> bool {
    lock.states()
        .history()
        .iter()
        .any(|t| t.from == from && t.to == to)
}
