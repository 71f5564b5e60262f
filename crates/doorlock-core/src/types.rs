use crate::{Result, constants::MAX_UID_LENGTH, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use subtle::ConstantTimeEq;

/// RFID card UID (1-10 bytes, ISO 14443-A single/double/triple size)
///
/// # Security
/// Equality is evaluated in constant time over the stored bytes. UIDs of
/// different length never compare equal, so a prefix of a stored UID is
/// never accepted.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardUid {
    bytes: [u8; MAX_UID_LENGTH],
    len: u8,
}

impl CardUid {
    /// Create a UID from raw bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidUidLength` if the slice is empty or longer than
    /// [`MAX_UID_LENGTH`].
    pub fn new(uid: &[u8]) -> Result<Self> {
        if uid.is_empty() || uid.len() > MAX_UID_LENGTH {
            return Err(Error::InvalidUidLength {
                len: uid.len(),
                max: MAX_UID_LENGTH,
            });
        }
        let mut bytes = [0u8; MAX_UID_LENGTH];
        bytes[..uid.len()].copy_from_slice(uid);
        Ok(Self {
            bytes,
            len: uid.len() as u8,
        })
    }

    /// Build a UID from a fixed-size array at compile time.
    pub const fn from_array<const N: usize>(uid: [u8; N]) -> Self {
        const { assert!(N > 0 && N <= MAX_UID_LENGTH, "UID length out of range") };
        let mut bytes = [0u8; MAX_UID_LENGTH];
        let mut i = 0;
        while i < N {
            bytes[i] = uid[i];
            i += 1;
        }
        Self {
            bytes,
            len: N as u8,
        }
    }

    /// The significant UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of significant bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false for a constructed UID; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Colon separated lowercase hex, e.g. `5e:a6:3d:eb`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.as_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl PartialEq for CardUid {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for CardUid {}

impl std::hash::Hash for CardUid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CardUid({})", self.to_hex())
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for CardUid {
    type Err = Error;

    /// Parse hex, with or without `:`/`-`/space separators.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();

        if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidUidFormat(s.to_string()));
        }

        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| Error::InvalidUidFormat(s.to_string()))?;

        CardUid::new(&bytes)
    }
}

impl TryFrom<String> for CardUid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CardUid> for String {
    fn from(uid: CardUid) -> Self {
        uid.to_hex()
    }
}

/// Software function flags stored in the database header.
///
/// The flags select how the lock reacts to keys, the door sensor and the
/// RTC. Unknown bits are preserved as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwFunction(u8);

impl SwFunction {
    /// No flag set: plain momentary unlock.
    pub const NONE: SwFunction = SwFunction(0);
    /// Intrusion alarm when the door stays open.
    pub const ALARM: SwFunction = SwFunction(1 << 0);
    /// Drive the slave lock output together with the bolt.
    pub const SLAVE: SwFunction = SwFunction(1 << 1);
    /// Keys toggle the bolt instead of a momentary unlock.
    pub const LATCH: SwFunction = SwFunction(1 << 2);
    /// Timed rental mode with automatic reopen.
    pub const GYM: SwFunction = SwFunction(1 << 3);

    /// Wrap a raw flag byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        SwFunction(bits)
    }

    /// The raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: SwFunction) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SwFunction {
    type Output = SwFunction;

    fn bitor(self, rhs: SwFunction) -> SwFunction {
        SwFunction(self.0 | rhs.0)
    }
}

impl fmt::Display for SwFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (SwFunction::ALARM, "ALARM"),
            (SwFunction::LATCH, "LATCH"),
            (SwFunction::SLAVE, "SLAVE"),
            (SwFunction::GYM, "GYM"),
        ];
        for (flag, name) in names {
            if self.contains(flag) {
                write!(f, "{} ", name)?;
            }
        }
        write!(f, "(0x{:02x})", self.0)
    }
}

/// Factory gym-definition cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GymVariant {
    /// Gym mode without automatic reopen; held long enough in learn mode it
    /// also wipes all keys.
    NoDelay,
    Hours6,
    Hours12,
    Hours24,
}

impl GymVariant {
    /// Open delay in hours programmed by this card.
    #[must_use]
    pub fn open_delay_hours(self) -> u8 {
        match self {
            GymVariant::NoDelay => 0,
            GymVariant::Hours6 => 6,
            GymVariant::Hours12 => 12,
            GymVariant::Hours24 => 24,
        }
    }
}

/// Role of a scanned card as resolved by the card database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Unknown,
    /// Enrolled key; `slot` is the key slot index it lives in.
    Key { slot: u8 },
    Programming,
    /// Software card carrying the function it selects.
    Software(SwFunction),
    GymSoftware(GymVariant),
}

impl CardType {
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, CardType::Unknown)
    }

    #[must_use]
    pub fn is_key(self) -> bool {
        matches!(self, CardType::Key { .. })
    }

    #[must_use]
    pub fn is_software(self) -> bool {
        matches!(self, CardType::Software(_))
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CardType::Unknown => write!(f, "unknown"),
            CardType::Key { slot } => write!(f, "key (slot {})", slot),
            CardType::Programming => write!(f, "programming"),
            CardType::Software(sw) => write!(f, "software {}", sw),
            CardType::GymSoftware(variant) => write!(f, "gym {:?}", variant),
        }
    }
}

/// Door position as seen by the door sensor interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    #[default]
    Unknown,
    Open,
    Closed,
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self {
            DoorState::Unknown => "unknown",
            DoorState::Open => "open",
            DoorState::Closed => "closed",
        };
        write!(f, "{}", state)
    }
}
