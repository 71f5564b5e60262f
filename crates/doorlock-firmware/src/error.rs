use doorlock_cardman::CardmanError;
use doorlock_core::ErrorKind;
use doorlock_hardware::HardwareError;
use thiserror::Error;

/// Errors surfaced by the firmware main loop.
///
/// Most failures inside a cycle are answered with a tone and never leave
/// the state machine; what reaches the caller is boot failure, storage
/// failure and configuration mistakes.
#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Cardman(#[from] CardmanError),

    #[error(transparent)]
    Core(#[from] doorlock_core::Error),
}

impl FirmwareError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FirmwareError::Hardware(e) => e.kind(),
            FirmwareError::Cardman(e) => e.kind(),
            FirmwareError::Core(e) => e.kind(),
        }
    }
}

/// Specialized result type for firmware operations
pub type Result<T> = std::result::Result<T, FirmwareError>;
