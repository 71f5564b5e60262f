//! End-to-end card handling through the main loop.
//!
//! Covers the wake-up dispatch, learn mode and both programming modes on a
//! mock board with the default configuration.

mod common;

use common::{cards::*, *};
use doorlock_core::{CardType, FirmwareConfig, SwFunction, constants::FACTORY_CARDS};
use doorlock_firmware::{MainState, RunOutcome};
use doorlock_hardware::Signal;

fn programmed(device: &mut doorlock_firmware::Device<doorlock_hardware::MockBoard>) {
    device.cards.set_software_function(SwFunction::NONE).unwrap();
    device.cards.set_programming_card(&PROGRAMMING).unwrap();
}

fn programmed_with_key(device: &mut doorlock_firmware::Device<doorlock_hardware::MockBoard>) {
    programmed(device);
    device.cards.add_key(&KEY_1).unwrap();
}

// ============================================================================
// Boot and idle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_boot_opens_empty_lock() {
    let (lock, handle) = start(|_| {}).await;

    assert_eq!(handle.buzzer.played(), vec![Signal::Hello]);
    assert!(handle.motor.is_open());
    assert!(handle.rfid.wake_armed().is_some());
    assert!(handle.rfid.is_paused());
    assert!(passed(&lock, MainState::Initialize, MainState::PrepareWakeUp));
}

#[tokio::test(start_paused = true)]
async fn test_idle_lock_stays_asleep() {
    let (mut lock, handle) = start(|_| {}).await;
    assert_eq!(run_for(&mut lock, 60_000).await, RunOutcome::DeadlineReached);
    assert_eq!(lock.wake_counter(), 0);
    assert_eq!(handle.rfid.scans(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_card_is_rejected() {
    let (mut lock, handle) = start(|_| {}).await;
    handle.rfid.present(STRANGER);
    run_for(&mut lock, 2_000).await;

    assert_eq!(handle.buzzer.played(), vec![Signal::Hello, Signal::Negative]);
    assert!(passed(&lock, MainState::WokenUp, MainState::FoundUnknownCard));
    assert_eq!(lock.bad_detection_counter(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_multiple_cards_is_an_error() {
    let (mut lock, handle) = start(|_| {}).await;
    handle.rfid.present(KEY_1);
    handle.rfid.present(STRANGER);
    run_for(&mut lock, 2_000).await;

    assert!(passed(&lock, MainState::WokenUp, MainState::ErrorMultipleCards));
    assert!(passed(&lock, MainState::ErrorMultipleCards, MainState::PrepareWakeUp));
    assert_eq!(handle.buzzer.played(), vec![Signal::Hello]);
    assert_eq!(lock.state(), MainState::DeepSleep);
}

#[tokio::test(start_paused = true)]
async fn test_key_opens_and_recloses() {
    let (mut lock, handle) = start(|device| {
        device.cards.set_software_function(SwFunction::NONE).unwrap();
        device.cards.add_key(&KEY_1).unwrap();
    })
    .await;
    assert!(!handle.motor.is_open());

    handle.rfid.present(KEY_1);
    run_for(&mut lock, 5_000).await;

    assert_eq!(handle.buzzer.played(), vec![Signal::Hello, Signal::Positive]);
    assert_eq!(handle.motor.strokes(), 2);
    assert!(!handle.motor.is_open());
    assert!(passed(&lock, MainState::EnterSoftwareKey, MainState::PrepareWakeUp));
}

#[tokio::test(start_paused = true)]
async fn test_scan_failure_counts_as_empty_wake() {
    let (mut lock, handle) = start(|_| {}).await;
    handle.rfid.fail_scans(1);
    handle.rfid.present(STRANGER);
    run_for(&mut lock, 1_000).await;

    assert_eq!(lock.bad_detection_counter(), 1);
    assert_eq!(handle.buzzer.played(), vec![Signal::Hello]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_wakes_without_keys_nap_and_chirp() {
    let (mut lock, handle) = start(|_| {}).await;
    for _ in 0..3 {
        handle.rfid.present(STRANGER);
        handle.rfid.remove(&STRANGER);
        run_for(&mut lock, 1_000).await;
    }
    assert_eq!(lock.bad_detection_counter(), 3);

    run_for(&mut lock, 5_000).await;
    assert_eq!(handle.buzzer.last(), Some(Signal::WakeUp));
}

#[tokio::test(start_paused = true)]
async fn test_empty_wakes_nap_without_chirp_when_keys_enrolled() {
    let (mut lock, handle) = start(programmed_with_key).await;
    for _ in 0..3 {
        handle.rfid.present(STRANGER);
        handle.rfid.remove(&STRANGER);
        run_for(&mut lock, 1_000).await;
    }
    assert_eq!(lock.bad_detection_counter(), 3);

    // still naps, but silently
    run_for(&mut lock, 5_000).await;
    assert!(!handle.buzzer.played().contains(&Signal::WakeUp));

    handle.rfid.present(KEY_1);
    run_for(&mut lock, 2_000).await;
    assert!(passed(&lock, MainState::WokenUp, MainState::EnterSoftwareKey));
    assert_eq!(lock.bad_detection_counter(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bad_detection_counter_saturates_at_max_threshold() {
    let config = FirmwareConfig::default().bad_detection_threshold(u8::MAX);
    let (mut lock, handle) = start_with(store(), config, |_| {}).await;

    for _ in 0..=(u8::MAX as u16 + 1) {
        handle.rfid.present(STRANGER);
        handle.rfid.remove(&STRANGER);
        run_for(&mut lock, 1_000).await;
    }
    assert_eq!(lock.bad_detection_counter(), u8::MAX);
}

// ============================================================================
// Learn mode
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_learn_mode_sets_programming_card() {
    let (mut lock, handle) = start(|_| {}).await;
    handle.press_learn();
    tap(&handle, PROGRAMMING, 500, 1_000);
    run_for(&mut lock, 10_000).await;

    assert_eq!(
        handle.buzzer.played(),
        vec![Signal::Hello, Signal::ModeFast, Signal::Positive]
    );
    assert_eq!(lock.device().cards.programming_card(), Some(&PROGRAMMING));
    assert!(passed(&lock, MainState::DeepSleep, MainState::EnterLearnMode));
    assert!(passed(&lock, MainState::WaitLearnMode, MainState::ExitProgOrLearnMode));
}

#[tokio::test(start_paused = true)]
async fn test_learn_mode_times_out() {
    let (mut lock, handle) = start(|_| {}).await;
    handle.press_learn();
    run_for(&mut lock, 10_000).await;

    assert_eq!(handle.buzzer.played(), vec![Signal::Hello, Signal::ModeFast]);
    assert_eq!(lock.device().cards.programming_card(), None);
    assert!(passed(&lock, MainState::WaitLearnMode, MainState::ExitProgOrLearnMode));
}

#[tokio::test(start_paused = true)]
async fn test_learn_mode_rejects_software_card() {
    let (factory, _) = FACTORY_CARDS[0];
    let (mut lock, handle) = start(|_| {}).await;
    handle.press_learn();
    tap(&handle, factory, 500, 1_000);
    run_for(&mut lock, 10_000).await;

    assert!(passed(&lock, MainState::WaitLearnMode, MainState::ErrorSetProgCardFailed));
    assert_eq!(handle.buzzer.last(), Some(Signal::Error));
    assert_eq!(lock.device().cards.programming_card(), None);
}

#[tokio::test(start_paused = true)]
async fn test_learn_mode_held_gym_card_deletes_keys() {
    let (no_delay, _) = FACTORY_CARDS[3];
    let (mut lock, handle) = start(programmed_with_key).await;
    handle.press_learn();
    tap(&handle, no_delay, 500, 12_000);

    assert_eq!(run_for(&mut lock, 20_000).await, RunOutcome::ResetRequested);
    assert_eq!(lock.device().cards.key_count(), 0);
    assert_eq!(lock.device().cards.software_function(), SwFunction::GYM);
    assert_eq!(lock.device().cards.open_delay(), 0);
    let deleted = handle.buzzer.played().iter().filter(|s| **s == Signal::AllDeleted).count();
    assert_eq!(deleted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_learn_mode_tapped_gym_card_keeps_keys() {
    let (no_delay, _) = FACTORY_CARDS[3];
    let (mut lock, handle) = start(programmed_with_key).await;
    handle.press_learn();
    tap(&handle, no_delay, 500, 1_000);

    assert_eq!(run_for(&mut lock, 20_000).await, RunOutcome::ResetRequested);
    assert_eq!(lock.device().cards.key_count(), 1);
    assert_eq!(lock.device().cards.software_function(), SwFunction::GYM);
    // only the provisioning tone, no deletion
    let deleted = handle.buzzer.played().iter().filter(|s| **s == Signal::AllDeleted).count();
    assert_eq!(deleted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_learn_mode_gym_card_requests_reset() {
    let (gym_12h, _) = FACTORY_CARDS[5];
    let store = store();
    let (mut lock, handle) = start_on(store.clone(), |_| {}).await;
    handle.press_learn();
    tap(&handle, gym_12h, 500, 1_000);

    assert_eq!(run_for(&mut lock, 10_000).await, RunOutcome::ResetRequested);
    assert_eq!(handle.buzzer.last(), Some(Signal::AllDeleted));
    drop(lock);

    // reboot on the same storage
    let (lock, _) = start_on(store, |_| {}).await;
    assert_eq!(lock.device().cards.software_function(), SwFunction::GYM);
    assert_eq!(lock.device().cards.open_delay(), 12);
}

// ============================================================================
// Programming modes
// ============================================================================


#[tokio::test(start_paused = true)]
async fn test_programming_mode_adds_key() {
    let (mut lock, handle) = start(programmed).await;
    assert!(handle.motor.is_open());

    tap(&handle, PROGRAMMING, 0, 500);
    tap(&handle, KEY_1, 1_000, 1_000);
    run_for(&mut lock, 10_000).await;

    assert_eq!(lock.device().cards.key_count(), 1);
    assert!(lock.device().cards.classify(&KEY_1).is_key());
    assert_eq!(
        handle.buzzer.played(),
        vec![Signal::Hello, Signal::ModeFast, Signal::Positive]
    );
    // first key locks the door
    assert!(!handle.motor.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_programming_mode_deletes_key() {
    let (mut lock, handle) = start(|device| {
        programmed(device);
        device.cards.add_key(&KEY_1).unwrap();
    })
    .await;
    assert!(!handle.motor.is_open());

    tap(&handle, PROGRAMMING, 0, 500);
    tap(&handle, KEY_1, 1_000, 1_000);
    run_for(&mut lock, 10_000).await;

    assert_eq!(lock.device().cards.key_count(), 0);
    assert_eq!(lock.device().cards.classify(&KEY_1), CardType::Unknown);
    assert_eq!(handle.buzzer.last(), Some(Signal::Negative));
    // last key gone, lock stays open
    assert!(handle.motor.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_programming_mode_times_out() {
    let (mut lock, handle) = start(programmed).await;
    tap(&handle, PROGRAMMING, 0, 500);
    run_for(&mut lock, 10_000).await;

    assert!(passed(&lock, MainState::WaitProgMode1, MainState::ExitProgOrLearnMode));
    assert!(!passed(&lock, MainState::WaitProgMode1, MainState::EnterProgrammingMode2));
    assert_eq!(lock.device().cards.key_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_hold_stays_in_mode_1() {
    let (mut lock, handle) = start(|device| {
        programmed(device);
        device.cards.add_key(&KEY_1).unwrap();
    })
    .await;

    // past the mode 1 window, short of the mode 2 hold
    tap(&handle, PROGRAMMING, 0, 4_000);
    run_for(&mut lock, 10_000).await;

    assert!(!passed(&lock, MainState::WaitProgMode1, MainState::EnterProgrammingMode2));
    assert!(passed(&lock, MainState::WaitProgMode1, MainState::ExitProgOrLearnMode));
    assert!(!handle.buzzer.played().contains(&Signal::ModeSlow));
    assert_eq!(lock.device().cards.key_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_holding_programming_card_deletes_all_keys() {
    let (mut lock, handle) = start(|device| {
        programmed(device);
        device.cards.add_key(&KEY_1).unwrap();
        device.cards.add_key(&KEY_2).unwrap();
    })
    .await;

    handle.rfid.present(PROGRAMMING);
    run_for(&mut lock, 30_000).await;

    assert!(passed(&lock, MainState::WaitProgMode1, MainState::EnterProgrammingMode2));
    assert!(passed(&lock, MainState::WaitProgMode2, MainState::ExitProgOrLearnMode));
    assert_eq!(lock.device().cards.key_count(), 0);
    let played = handle.buzzer.played();
    assert!(played.contains(&Signal::ModeSlow));
    assert_eq!(played.last(), Some(&Signal::AllDeleted));
    assert!(handle.motor.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_releasing_card_in_mode_2_falls_back() {
    let (mut lock, handle) = start(|device| {
        programmed(device);
        device.cards.add_key(&KEY_1).unwrap();
    })
    .await;

    tap(&handle, PROGRAMMING, 0, 12_000);
    run_for(&mut lock, 30_000).await;

    assert!(passed(&lock, MainState::WaitProgMode2, MainState::EnterProgrammingMode1));
    assert_eq!(lock.device().cards.key_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_software_card_switches_function() {
    let (latch, _) = FACTORY_CARDS[1];
    let (mut lock, handle) = start(|_| {}).await;
    handle.rfid.present(latch);
    run_for(&mut lock, 5_000).await;

    assert_eq!(lock.device().cards.software_function(), SwFunction::LATCH);
    assert_eq!(handle.buzzer.played(), vec![Signal::Hello, Signal::SetSoftware]);
    assert!(passed(&lock, MainState::WokenUp, MainState::ExitProgOrLearnMode));
}
