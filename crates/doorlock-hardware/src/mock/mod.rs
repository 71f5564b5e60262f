//! Mock peripherals for testing and simulation.
//!
//! Each mock is split into the device half the firmware owns and a handle
//! the test (or the simulator) keeps to drive and inspect it.

pub mod buzzer;
pub mod door;
pub mod motor;
pub mod page_store;
pub mod rfid;
pub mod rtc;

pub use buzzer::{MockBuzzer, MockBuzzerHandle};
pub use door::MockDoor;
pub use motor::{MockMotor, MockMotorHandle};
pub use page_store::{MemoryPageStore, StoreOp};
pub use rfid::{MockRfid, MockRfidHandle};
pub use rtc::TokioRtc;
