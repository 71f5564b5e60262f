//! Peripheral abstraction layer for the door lock firmware.
//!
//! The firmware talks to its hardware only through the traits in
//! [`traits`]: page storage, the motor bridge, the buzzer, the RFID
//! transceiver, the RTC and the door contacts. Interrupt sources report
//! through a shared [`IrqFlags`] set that the main loop polls.
//!
//! # Mock Implementations
//!
//! [`mock`] provides tokio-time simulations of every peripheral, bundled by
//! [`MockBoard`]:
//!
//! ```
//! use std::time::Duration;
//! use doorlock_hardware::{MockBoard, mock::MemoryPageStore};
//!
//! let store = MemoryPageStore::new(32, 64);
//! let (peripherals, handle) = MockBoard::build(store, Duration::from_millis(10));
//! handle.press_learn();
//! assert!(peripherals.irq.any());
//! ```

pub mod board;
pub mod door;
pub mod error;
pub mod irq;
pub mod mock;
pub mod tone;
pub mod traits;

pub use board::{Board, BoardHandle, MockBoard, Peripherals};
pub use door::{DoorEdge, DoorMonitor};
pub use error::{HardwareError, Result};
pub use irq::{Irq, IrqFlags, IrqGuard};
pub use tone::Signal;
pub use traits::{Buzzer, DoorSensor, MotorBridge, PageStore, RfidScanner, RtcTimer};
