//! Hosted simulator for the door lock firmware.
//!
//! Runs the firmware against [`doorlock_hardware::MockBoard`] under a
//! scripted [`Scenario`] and summarizes what the lock did.

pub mod scenario;
pub mod sim;

pub use scenario::{Action, Event, Scenario, load_config};
pub use sim::{Report, Simulator};
