//! Dual-copy database header.
//!
//! Two header copies live on pages 0 and 1. Each written copy carries a
//! state marker, X or Z; an erased copy decodes as Fresh and anything else
//! as Invalid. The pair of decoded markers selects which copy is current and
//! where the next write goes, so a write torn by power loss always leaves
//! the other copy intact and authoritative.
//!
//! Writes alternate H1, H2, H1, ... and the marker sequence cycles
//! `X(H1) X(H2) Z(H1) Z(H2) X(H1) ...`.

use doorlock_core::SwFunction;
use std::fmt;

/// Size of an encoded header.
pub const HEADER_SIZE: usize = 8;

/// Version written by this firmware.
pub const DB_VERSION_CURRENT: u16 = 1;

/// Version read from an erased header.
pub const DB_VERSION_UNINITIALIZED: u16 = 0xffff;

const MARKER_X: u8 = 0xaa;
const MARKER_Z: u8 = 0x55;
const MARKER_ERASED: u8 = 0xff;

/// Decoded state marker of one header copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderState {
    /// Erased, never written
    Fresh,
    X,
    Z,
    /// Garbage, typically a torn write
    Invalid,
}

impl HeaderState {
    pub fn decode(byte: u8) -> Self {
        match byte {
            MARKER_X => HeaderState::X,
            MARKER_Z => HeaderState::Z,
            MARKER_ERASED => HeaderState::Fresh,
            _ => HeaderState::Invalid,
        }
    }

    /// On-storage byte for a marker that can be written.
    pub fn marker(self) -> Option<u8> {
        match self {
            HeaderState::X => Some(MARKER_X),
            HeaderState::Z => Some(MARKER_Z),
            HeaderState::Fresh | HeaderState::Invalid => None,
        }
    }

    fn symbol(self) -> char {
        match self {
            HeaderState::Fresh => 'F',
            HeaderState::X => 'X',
            HeaderState::Z => 'Z',
            HeaderState::Invalid => 'I',
        }
    }
}

/// One of the two header copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderSlot {
    H1,
    H2,
}

impl HeaderSlot {
    /// Storage page holding this copy.
    pub fn page(self) -> usize {
        match self {
            HeaderSlot::H1 => 0,
            HeaderSlot::H2 => 1,
        }
    }
}

/// Decoded markers of both copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombinedState {
    pub h1: HeaderState,
    pub h2: HeaderState,
}

impl CombinedState {
    pub fn new(h1: HeaderState, h2: HeaderState) -> Self {
        Self { h1, h2 }
    }

    /// Copy holding the current header, or `None` if the pair cannot have
    /// been produced by the write sequence.
    pub fn authoritative(self) -> Option<HeaderSlot> {
        use HeaderState::*;
        match (self.h1, self.h2) {
            (Fresh, Fresh) | (X, X) | (Z, Z) | (Invalid, X) | (Invalid, Z) => Some(HeaderSlot::H2),
            (X, Fresh) | (X, Z) | (X, Invalid) | (Z, X) | (Z, Invalid) => Some(HeaderSlot::H1),
            _ => None,
        }
    }

    /// Copy and marker for the next header write. Defined for every pair;
    /// pairs that cannot occur restart the sequence at H1 with X.
    pub fn next_write(self) -> (HeaderSlot, HeaderState) {
        use HeaderState::*;
        match (self.h1, self.h2) {
            (Fresh, Fresh) | (Z, Z) | (Invalid, Z) => (HeaderSlot::H1, X),
            (X, X) | (Invalid, X) => (HeaderSlot::H1, Z),
            (X, Fresh) | (X, Z) | (X, Invalid) => (HeaderSlot::H2, X),
            (Z, X) | (Z, Invalid) => (HeaderSlot::H2, Z),
            _ => (HeaderSlot::H1, X),
        }
    }

    /// Pair after writing `marker` into `slot`.
    pub fn after_write(self, slot: HeaderSlot, marker: HeaderState) -> Self {
        match slot {
            HeaderSlot::H1 => Self::new(marker, self.h2),
            HeaderSlot::H2 => Self::new(self.h1, marker),
        }
    }
}

impl fmt::Display for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.h1.symbol(), self.h2.symbol())
    }
}

/// Header contents.
///
/// Layout (little-endian):
/// `state u8 | db_version u16 | nkeys u8 | nsoft u8 | current_sw u8 | open_delay u8 | reserved u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderEntry {
    pub db_version: u16,
    pub nkeys: u8,
    pub nsoft: u8,
    pub software_function: SwFunction,
    /// Gym auto-open delay in hours
    pub open_delay: u8,
}

impl HeaderEntry {
    /// Header of a freshly formatted database.
    pub fn formatted(software_function: SwFunction) -> Self {
        Self {
            db_version: DB_VERSION_CURRENT,
            nkeys: 0,
            nsoft: 0,
            software_function,
            open_delay: 0,
        }
    }

    pub fn encode(&self, marker: HeaderState) -> [u8; HEADER_SIZE] {
        let version = self.db_version.to_le_bytes();
        [
            marker.marker().unwrap_or(MARKER_ERASED),
            version[0],
            version[1],
            self.nkeys,
            self.nsoft,
            self.software_function.bits(),
            self.open_delay,
            MARKER_ERASED,
        ]
    }

    /// Decode the header fields of a page. The state byte is ignored;
    /// decode it with [`HeaderState::decode`].
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            db_version: u16::from_le_bytes([bytes[1], bytes[2]]),
            nkeys: bytes[3],
            nsoft: bytes[4],
            software_function: SwFunction::from_bits(bytes[5]),
            open_delay: bytes[6],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HeaderState::*;
    use rstest::rstest;

    const ALL: [HeaderState; 4] = [Fresh, X, Z, Invalid];

    #[rstest]
    #[case(0xaa, X)]
    #[case(0x55, Z)]
    #[case(0xff, Fresh)]
    #[case(0x00, Invalid)]
    #[case(0x13, Invalid)]
    fn test_decode_marker(#[case] byte: u8, #[case] state: HeaderState) {
        assert_eq!(HeaderState::decode(byte), state);
    }

    #[rstest]
    #[case(Fresh, Fresh, Some(HeaderSlot::H2), HeaderSlot::H1, X)]
    #[case(X, X, Some(HeaderSlot::H2), HeaderSlot::H1, Z)]
    #[case(Z, Z, Some(HeaderSlot::H2), HeaderSlot::H1, X)]
    #[case(Invalid, X, Some(HeaderSlot::H2), HeaderSlot::H1, Z)]
    #[case(Invalid, Z, Some(HeaderSlot::H2), HeaderSlot::H1, X)]
    #[case(X, Fresh, Some(HeaderSlot::H1), HeaderSlot::H2, X)]
    #[case(X, Z, Some(HeaderSlot::H1), HeaderSlot::H2, X)]
    #[case(X, Invalid, Some(HeaderSlot::H1), HeaderSlot::H2, X)]
    #[case(Z, X, Some(HeaderSlot::H1), HeaderSlot::H2, Z)]
    #[case(Z, Invalid, Some(HeaderSlot::H1), HeaderSlot::H2, Z)]
    #[case(Invalid, Invalid, None, HeaderSlot::H1, X)]
    #[case(Fresh, X, None, HeaderSlot::H1, X)]
    #[case(Z, Fresh, None, HeaderSlot::H1, X)]
    fn test_transition_table(
        #[case] h1: HeaderState,
        #[case] h2: HeaderState,
        #[case] authoritative: Option<HeaderSlot>,
        #[case] next_slot: HeaderSlot,
        #[case] next_marker: HeaderState,
    ) {
        let combined = CombinedState::new(h1, h2);
        assert_eq!(combined.authoritative(), authoritative);
        assert_eq!(combined.next_write(), (next_slot, next_marker));
    }

    #[test]
    fn test_next_write_always_writable() {
        for h1 in ALL {
            for h2 in ALL {
                let (_, marker) = CombinedState::new(h1, h2).next_write();
                assert!(marker.marker().is_some());
            }
        }
    }

    #[test]
    fn test_write_sequence_alternates_and_stays_authoritative() {
        let mut combined = CombinedState::new(X, Fresh);
        let mut expected_slot = HeaderSlot::H2;
        for _ in 0..12 {
            let (slot, marker) = combined.next_write();
            assert_eq!(slot, expected_slot);
            combined = combined.after_write(slot, marker);
            assert_eq!(combined.authoritative(), Some(slot));
            expected_slot = match slot {
                HeaderSlot::H1 => HeaderSlot::H2,
                HeaderSlot::H2 => HeaderSlot::H1,
            };
        }
    }

    #[test]
    fn test_torn_write_keeps_previous_copy() {
        let mut combined = CombinedState::new(X, Fresh);
        for _ in 0..8 {
            let (slot, marker) = combined.next_write();
            let previous = combined.authoritative();
            let torn = combined.after_write(slot, Invalid);
            assert_eq!(torn.authoritative(), previous);
            combined = combined.after_write(slot, marker);
        }
    }

    #[test]
    fn test_entry_layout() {
        let entry = HeaderEntry {
            db_version: 1,
            nkeys: 3,
            nsoft: 2,
            software_function: SwFunction::GYM,
            open_delay: 12,
        };
        let bytes = entry.encode(Z);
        assert_eq!(bytes, [0x55, 0x01, 0x00, 3, 2, 0x08, 12, 0xff]);
        assert_eq!(HeaderEntry::decode(&bytes), entry);
    }

    #[test]
    fn test_erased_entry_is_uninitialized() {
        let entry = HeaderEntry::decode(&[0xff; HEADER_SIZE]);
        assert_eq!(entry.db_version, DB_VERSION_UNINITIALIZED);
    }

    #[test]
    fn test_display() {
        assert_eq!(CombinedState::new(X, Invalid).to_string(), "XI");
    }
}
