//! Firmware-wide constants.
//!
//! This module collects the fixed numbers of the lock: database capacities,
//! default timeouts, the factory card table and the firmware version. Values
//! that a deployment may tune are mirrored as defaults in
//! [`FirmwareConfig`](crate::config::FirmwareConfig); the rest are fixed by
//! the on-storage format and must not change.
//!
//! # Usage
//!
//! ```
//! use doorlock_core::constants::*;
//!
//! assert_eq!(MAX_KEY_CARDS, 50);
//! assert_eq!(FIRMWARE_VERSION, "v3.3.1");
//! assert_eq!(FACTORY_CARDS.len(), 7);
//! ```

use crate::types::{CardType, CardUid, GymVariant, SwFunction};

// ============================================================================
// Identification
// ============================================================================

/// Firmware version string logged at boot.
pub const FIRMWARE_VERSION: &str = "v3.3.1";

// ============================================================================
// Card database capacities
// ============================================================================

/// Maximum UID length in bytes (ISO 14443-A triple-size UID).
pub const MAX_UID_LENGTH: usize = 10;

/// Maximum number of enrolled key cards.
pub const MAX_KEY_CARDS: usize = 50;

/// Maximum number of stored software cards.
///
/// Software cards are packed two per page, so this must stay even.
pub const MAX_SOFT_CARDS: usize = 6;

/// Software function written when a database is formatted.
pub const DEFAULT_SOFTWARE_FUNCTION: SwFunction = SwFunction::ALARM;

// ============================================================================
// Timeouts (seconds, RTC resolution)
// ============================================================================

/// Window the motor has to reach the requested position.
pub const TIMEOUT_MOTOR: u8 = 3;

/// Learn mode scan window.
pub const TIMEOUT_LEARN_MODE: u8 = 3;

/// Programming mode 2 window; holding the programming card until it ends
/// confirms deletion of all keys.
pub const TIMEOUT_DELETE_ALL: u8 = 15;

/// Programming mode 1 scan window.
pub const TIMEOUT_PROG_MODE_1: u8 = 3;

/// How long the bolt stays open for a momentary unlock.
pub const TIMEOUT_LOCK_OPEN_WAIT: u8 = 3;

/// Period of the repeating alarm.
pub const TIMEOUT_REPEATING_ALARM: u8 = 1;

/// Delay between an open door being noticed and the first alarm.
pub const TIMEOUT_FIRST_ALARM: u8 = 20;

/// Programming card hold time that escalates to programming mode 2.
pub const TIMEOUT_SWITCH_TO_PROG2: u8 = 9;

/// Gym card hold time in learn mode that wipes all keys.
pub const TIMEOUT_GYM_DELETE_ALL_HOLD: u8 = 10;

// ============================================================================
// Main loop tuning
// ============================================================================

/// Consecutive empty wake-ups before the lock naps.
pub const BAD_DETECTION_THRESHOLD: u8 = 3;

/// Length of the nap after too many empty wake-ups.
pub const BAD_DETECTION_NAP_SECS: u8 = 2;

/// Length of one gym relock tick.
pub const GYM_TICK_SECS: u8 = 60;

/// Number of door state samples per debounced read.
pub const DOOR_NUMBER_OF_CHECKS: u8 = 10;

/// Interval between door state samples.
pub const DOOR_CHECK_INTERVAL_MS: u64 = 1;

/// Guard delay before a swapped door edge is armed again.
pub const DOOR_GUARD_DELAY_MS: u64 = 10;

/// Settle time after power-up before the RFID front end is used.
pub const STARTUP_WAIT_MS: u64 = 1500;

// ============================================================================
// Factory cards
// ============================================================================

/// Cards recognised by every lock regardless of database contents.
///
/// They are checked before any stored card, in this order.
pub const FACTORY_CARDS: [(CardUid, CardType); 7] = [
    (
        CardUid::from_array([0x5e, 0xa6, 0x3d, 0xeb]),
        CardType::Software(SwFunction::SLAVE),
    ),
    (
        CardUid::from_array([0xda, 0xcf, 0x32, 0xe9]),
        CardType::Software(SwFunction::LATCH),
    ),
    (
        CardUid::from_array([0xae, 0xec, 0x3d, 0xeb]),
        CardType::Software(SwFunction::ALARM),
    ),
    (
        CardUid::from_array([0xf7, 0xa8, 0x33, 0x3b]),
        CardType::GymSoftware(GymVariant::NoDelay),
    ),
    (
        CardUid::from_array([0x6e, 0x4f, 0x26, 0xab]),
        CardType::GymSoftware(GymVariant::Hours6),
    ),
    (
        CardUid::from_array([0x1e, 0x12, 0x2a, 0xcc]),
        CardType::GymSoftware(GymVariant::Hours12),
    ),
    (
        CardUid::from_array([0x6e, 0x8c, 0x26, 0xce]),
        CardType::GymSoftware(GymVariant::Hours24),
    ),
];
