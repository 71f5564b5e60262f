//! Collaborator trait definitions.
//!
//! These traits are the contract between the lock firmware and the
//! peripherals it drives: page storage, the motor H-bridge, the buzzer, the
//! RFID front end, the RTC and the door contacts. Mock implementations live
//! in [`mock`](crate::mock).
//!
//! Async methods use native `async fn` in traits, so the traits are used
//! through generics rather than trait objects.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::tone::Signal;
use doorlock_core::{CardUid, DoorState, WakeDetection};

/// Raw byte-addressable non-volatile memory split into fixed-size pages.
///
/// `write_page` is atomic per page on real hardware except under power loss;
/// erased bytes read back as `0xff`.
pub trait PageStore {
    fn page_size(&self) -> usize;

    fn page_count(&self) -> usize;

    /// Read a whole page into `buf` (`buf.len() == page_size()`).
    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<()>;

    /// Program `data` at the start of `page`. Shorter data leaves the tail
    /// of the page erased.
    fn write_page(&mut self, page: usize, data: &[u8]) -> Result<()>;

    fn erase_page(&mut self, page: usize) -> Result<()>;
}

/// Motor H-bridge with the lock position contact and the supply monitor.
pub trait MotorBridge {
    fn set_motor(&mut self, on: bool);

    /// Level of the lock contact; true while the bolt is retracted.
    fn lock_sensor_open(&self) -> bool;

    fn start_vcc_monitor(&mut self);

    fn stop_vcc_monitor(&mut self);

    /// Latched brownout flag. Once set it stays set until power-up.
    fn vcc_low(&self) -> bool;

    /// Slave lock output line.
    fn set_slave_output(&mut self, active: bool);
}

/// Buzzer sequence player.
pub trait Buzzer {
    /// Start `signal`, replacing whatever is playing.
    fn play(&mut self, signal: Signal, repeat: bool);

    fn stop(&mut self);

    /// Block until a non-repeating sequence has finished.
    async fn wait_until_finished(&mut self);

    fn is_running(&self) -> bool;
}

/// RFID transceiver.
pub trait RfidScanner {
    /// Bring up the reader after power-up.
    fn initialize(&mut self) -> Result<()>;

    /// Run one anticollision scan, calling `on_card` once per distinct card
    /// in the field.
    async fn scan(
        &mut self,
        unit: u8,
        scan_id: u8,
        on_card: &mut dyn FnMut(&CardUid),
    ) -> Result<()>;

    /// Arm the field-change detector used to wake from deep sleep.
    fn arm_wake_detector(&mut self, mode: WakeDetection) -> Result<()>;

    /// Disarm the detector, returning whether it fired while armed.
    fn disarm_wake_detector(&mut self) -> bool;

    /// Release the bus before sleep.
    fn pause(&mut self);

    /// Re-initialize the bus after wake.
    fn reinitialize(&mut self) -> Result<()>;
}

/// One-shot RTC countdown with seconds resolution.
pub trait RtcTimer {
    /// Start a window without interrupt; `0` stops the timer.
    fn start(&mut self, seconds: u8);

    /// Start a window that raises the RTC interrupt on expiry.
    fn start_with_interrupt(&mut self, seconds: u8);

    fn stop(&mut self);

    /// True once the window expired or the timer was stopped.
    fn is_finished(&self) -> bool;

    /// True if at least `seconds` have elapsed since the window was started.
    /// A window that expires early does not count as the full time passing.
    fn seconds_passed(&self, seconds: u8) -> bool;

    /// Test-and-clear the expiry interrupt.
    fn poll_interrupt(&mut self) -> bool;

    /// Peek at the expiry interrupt without clearing it.
    fn interrupt_pending(&self) -> bool;
}

/// Interrupt-maintained door state.
pub trait DoorSensor {
    fn door_state(&self) -> DoorState;
}
