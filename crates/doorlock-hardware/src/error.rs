//! Error types for hardware operations.
//!
//! Collaborator failures are few: a deadline expiring, the supply dropping
//! under load, a bus transfer going wrong, or storage returning something
//! that cannot be used.

use doorlock_core::ErrorKind;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Supply voltage dropped below the motor threshold.
    #[error("VCC low during {operation}")]
    VccLow { operation: String },

    /// SPI/UART transfer to a peripheral failed.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Page index beyond the store's capacity.
    #[error("Page {page} out of range (capacity {count})")]
    PageOutOfRange { page: usize, count: usize },
}

impl HardwareError {
    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new VCC low error.
    pub fn vcc_low(operation: impl Into<String>) -> Self {
        Self::VccLow {
            operation: operation.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HardwareError::Timeout { .. } => ErrorKind::Timeout,
            HardwareError::VccLow { .. } => ErrorKind::VccLow,
            HardwareError::CommunicationError { .. } => ErrorKind::Request,
            HardwareError::InvalidData { .. } => ErrorKind::BadData,
            HardwareError::PageOutOfRange { .. } => ErrorKind::Parameter,
        }
    }
}
