use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// RTC window lengths in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Window the motor has to reach the requested position
    pub motor: u8,

    /// Learn mode scan window
    pub learn_mode: u8,

    /// Programming mode 2 confirmation window
    pub delete_all: u8,

    /// Programming mode 1 scan window
    pub prog_mode_1: u8,

    /// Bolt open time for a momentary unlock
    pub lock_open_wait: u8,

    /// Period of the repeating alarm
    pub repeating_alarm: u8,

    /// Delay before the first alarm
    pub first_alarm: u8,

    /// Programming card hold time that escalates to programming mode 2,
    /// counted from entering programming mode 1
    pub switch_to_prog2: u8,

    /// Gym card hold time in learn mode that wipes all keys, counted from
    /// entering learn mode
    pub gym_delete_all_hold: u8,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            motor: TIMEOUT_MOTOR,
            learn_mode: TIMEOUT_LEARN_MODE,
            delete_all: TIMEOUT_DELETE_ALL,
            prog_mode_1: TIMEOUT_PROG_MODE_1,
            lock_open_wait: TIMEOUT_LOCK_OPEN_WAIT,
            repeating_alarm: TIMEOUT_REPEATING_ALARM,
            first_alarm: TIMEOUT_FIRST_ALARM,
            switch_to_prog2: TIMEOUT_SWITCH_TO_PROG2,
            gym_delete_all_hold: TIMEOUT_GYM_DELETE_ALL_HOLD,
        }
    }
}

impl Timeouts {
    fn validate(&self) -> Result<()> {
        let windows = [
            ("motor", self.motor),
            ("learn_mode", self.learn_mode),
            ("delete_all", self.delete_all),
            ("prog_mode_1", self.prog_mode_1),
            ("lock_open_wait", self.lock_open_wait),
            ("repeating_alarm", self.repeating_alarm),
            ("first_alarm", self.first_alarm),
            ("switch_to_prog2", self.switch_to_prog2),
            ("gym_delete_all_hold", self.gym_delete_all_hold),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::config(format!("timeout {} must be non-zero", name)));
        }
        Ok(())
    }
}

/// Field-change detector used to wake the lock from deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeDetection {
    /// Antenna phase shift detection
    #[default]
    Phase,
    /// Antenna capacitance detection
    Capacitive,
}

/// Tunable firmware parameters.
///
/// Everything here has a factory default; a deployment only overrides what
/// it needs.
///
/// # Example
///
/// ```
/// use doorlock_core::{FirmwareConfig, WakeDetection};
///
/// let config = FirmwareConfig::new()
///     .gym_tick_secs(30)
///     .wake_detection(WakeDetection::Capacitive);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    pub timeouts: Timeouts,

    /// Consecutive empty wake-ups before the lock naps
    pub bad_detection_threshold: u8,

    /// Length of the nap in seconds
    pub bad_detection_nap_secs: u8,

    /// Length of one gym relock tick in seconds
    pub gym_tick_secs: u8,

    /// Door state samples per debounced read
    pub door_checks: u8,

    pub door_check_interval_ms: u64,

    pub door_guard_delay_ms: u64,

    pub wake_detection: WakeDetection,

    /// Settle time after power-up
    pub startup_wait_ms: u64,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            bad_detection_threshold: BAD_DETECTION_THRESHOLD,
            bad_detection_nap_secs: BAD_DETECTION_NAP_SECS,
            gym_tick_secs: GYM_TICK_SECS,
            door_checks: DOOR_NUMBER_OF_CHECKS,
            door_check_interval_ms: DOOR_CHECK_INTERVAL_MS,
            door_guard_delay_ms: DOOR_GUARD_DELAY_MS,
            wake_detection: WakeDetection::default(),
            startup_wait_ms: STARTUP_WAIT_MS,
        }
    }
}

impl FirmwareConfig {
    /// Factory defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all RTC windows
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the empty wake-up threshold
    pub fn bad_detection_threshold(mut self, threshold: u8) -> Self {
        self.bad_detection_threshold = threshold;
        self
    }

    /// Set the nap length after too many empty wake-ups
    pub fn bad_detection_nap_secs(mut self, secs: u8) -> Self {
        self.bad_detection_nap_secs = secs;
        self
    }

    /// Set the gym relock tick length
    pub fn gym_tick_secs(mut self, secs: u8) -> Self {
        self.gym_tick_secs = secs;
        self
    }

    /// Set the number of door samples
    pub fn door_checks(mut self, checks: u8) -> Self {
        self.door_checks = checks;
        self
    }

    /// Set the door edge guard delay
    pub fn door_guard_delay_ms(mut self, ms: u64) -> Self {
        self.door_guard_delay_ms = ms;
        self
    }

    /// Set the wake-up detector
    pub fn wake_detection(mut self, detection: WakeDetection) -> Self {
        self.wake_detection = detection;
        self
    }

    /// Set the power-up settle time
    pub fn startup_wait_ms(mut self, ms: u64) -> Self {
        self.startup_wait_ms = ms;
        self
    }

    pub fn door_check_interval(&self) -> Duration {
        Duration::from_millis(self.door_check_interval_ms)
    }

    pub fn door_guard_delay(&self) -> Duration {
        Duration::from_millis(self.door_guard_delay_ms)
    }

    pub fn startup_wait(&self) -> Duration {
        Duration::from_millis(self.startup_wait_ms)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;

        if self.bad_detection_threshold == 0 {
            return Err(Error::config("bad_detection_threshold must be non-zero"));
        }
        if self.gym_tick_secs == 0 {
            return Err(Error::config("gym_tick_secs must be non-zero"));
        }
        if self.door_checks == 0 || self.door_checks > 100 {
            return Err(Error::config("door_checks must be 1-100"));
        }
        if self.door_check_interval_ms > 100 {
            return Err(Error::config("door_check_interval_ms must be at most 100"));
        }
        if self.timeouts.switch_to_prog2 <= self.timeouts.prog_mode_1 {
            return Err(Error::config(
                "switch_to_prog2 must be longer than prog_mode_1",
            ));
        }
        Ok(())
    }
}
