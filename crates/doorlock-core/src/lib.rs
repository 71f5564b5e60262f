//! Core types shared by every doorlock crate.
//!
//! This crate holds the vocabulary of the lock firmware: card identifiers,
//! card roles, software-function flags, the error taxonomy and the
//! firmware configuration. It has no knowledge of hardware or storage.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{FirmwareConfig, Timeouts, WakeDetection};
pub use error::{Error, ErrorKind, Result};
pub use types::*;

/// Crate version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
