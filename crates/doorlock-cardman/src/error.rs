use doorlock_core::{CardType, CardUid, ErrorKind};
use doorlock_hardware::HardwareError;
use thiserror::Error;

/// Card database errors.
///
/// Corruption is always reported as [`CardmanError::BadData`] or
/// [`CardmanError::Corrupt`]; the caller answers both by reformatting.
#[derive(Debug, Error)]
pub enum CardmanError {
    /// Card already has a role
    #[error("Card {uid} is already registered as {card_type}")]
    AlreadyExists { uid: CardUid, card_type: CardType },

    /// No free slot of the requested kind
    #[error("{what} storage full ({capacity} entries)")]
    Full { what: &'static str, capacity: usize },

    /// Header counts a free slot that storage does not have
    #[error("No unused {what} slot although the header counts {count}")]
    Corrupt { what: &'static str, count: u8 },

    #[error("Card {uid} is not a key ({card_type})")]
    NotAKey { uid: CardUid, card_type: CardType },

    #[error("Card {uid} ({card_type}) cannot become the programming card")]
    Rejected { uid: CardUid, card_type: CardType },

    /// Headers or slots cannot be decoded
    #[error("Bad database data: {0}")]
    BadData(String),

    #[error("Unsupported database version {0:#06x}")]
    UnsupportedVersion(u16),

    /// Layout does not fit the page store
    #[error("Database layout misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Core(#[from] doorlock_core::Error),
}

impl CardmanError {
    pub fn bad_data(message: impl Into<String>) -> Self {
        Self::BadData(message.into())
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CardmanError::AlreadyExists { .. }
            | CardmanError::NotAKey { .. }
            | CardmanError::Rejected { .. } => ErrorKind::Request,
            CardmanError::Full { .. } => ErrorKind::NoMemory,
            CardmanError::Corrupt { .. } | CardmanError::BadData(_) => ErrorKind::BadData,
            CardmanError::UnsupportedVersion(_) => ErrorKind::NotSupported,
            CardmanError::Misconfigured(_) => ErrorKind::Parameter,
            CardmanError::Hardware(e) => e.kind(),
            CardmanError::Core(e) => e.kind(),
        }
    }
}

/// Specialized result type for card database operations
pub type Result<T> = std::result::Result<T, CardmanError>;
