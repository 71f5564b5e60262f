//! Door lock firmware logic.
//!
//! This crate is the application running on the lock: a cooperative main
//! loop that sleeps until the learn button, the door contacts, the RTC or
//! the RFID wake detector fires, identifies the card in the field and acts
//! on it. Per-deployment behavior (alarm, latch, slave output, gym lockers)
//! lives in [`software`].
//!
//! Hardware is reached only through [`doorlock_hardware::Board`], so the
//! same loop runs against the mock board in tests and in the simulator.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use doorlock_cardman::DatabaseLayout;
//! use doorlock_core::{CardUid, FirmwareConfig};
//! use doorlock_firmware::{MainState, RunOutcome, boot};
//! use doorlock_hardware::{MockBoard, Signal, mock::MemoryPageStore};
//!
//! #[tokio::main(flavor = "current_thread", start_paused = true)]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FirmwareConfig::default();
//!     let store = MemoryPageStore::new(32, 64);
//!     let (peripherals, handle) = MockBoard::build(store, config.door_guard_delay());
//!
//!     let mut lock = boot(peripherals, DatabaseLayout::default(), config).await?;
//!     let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
//!     assert_eq!(lock.run_until(deadline).await?, RunOutcome::DeadlineReached);
//!     assert_eq!(lock.state(), MainState::DeepSleep);
//!
//!     // no keys enrolled: any card is unknown
//!     handle.rfid.present(CardUid::from_array([0x04, 0x01, 0x02, 0x03]));
//!     let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
//!     lock.run_until(deadline).await?;
//!     assert_eq!(handle.buzzer.last(), Some(Signal::Negative));
//!     Ok(())
//! }
//! ```

pub mod boot;
pub mod device;
pub mod door;
pub mod error;
pub mod machine;
pub mod motor;
pub mod software;
pub mod state;

pub use boot::boot;
pub use device::{Device, ScanResult};
pub use error::{FirmwareError, Result};
pub use machine::{MainStateMachine, RunOutcome, Step};
pub use motor::MotorController;
pub use software::{AlarmState, GymState, SoftwareFunctionEngine, Trigger};
pub use state::{MainState, StateTracker, StateTransition};
