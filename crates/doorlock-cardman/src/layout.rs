//! Page map and slot encodings.
//!
//! | Pages | Contents |
//! |---|---|
//! | 0, 1 | header copies |
//! | 2 | programming card |
//! | 3.. | software cards, two per page |
//! | after soft pages | key cards, one per page |

use crate::error::{CardmanError, Result};
use crate::header::HEADER_SIZE;
use doorlock_core::constants::{MAX_KEY_CARDS, MAX_SOFT_CARDS, MAX_UID_LENGTH};
use doorlock_core::{CardUid, SwFunction};
use doorlock_hardware::PageStore;
use serde::{Deserialize, Serialize};

/// Page of the programming card slot.
pub const PROG_PAGE: usize = 2;

/// First software card page.
pub const SOFT_START_PAGE: usize = 3;

/// Software card entries per page.
pub const SOFT_PER_PAGE: usize = 2;

/// `used | uid[10] | len`
pub const CARD_RECORD_SIZE: usize = 1 + MAX_UID_LENGTH + 1;

/// `used | uid[10] | len | sw_function`
pub const SOFT_RECORD_SIZE: usize = CARD_RECORD_SIZE + 1;

const USED: u8 = 1;
const PADDING: u8 = 0xff;

/// Database geometry on a page store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseLayout {
    pub page_size: usize,
    pub page_count: usize,
    pub max_keys: usize,
    pub max_soft: usize,
}

impl Default for DatabaseLayout {
    fn default() -> Self {
        Self {
            page_size: 32,
            page_count: 64,
            max_keys: MAX_KEY_CARDS,
            max_soft: MAX_SOFT_CARDS,
        }
    }
}

impl DatabaseLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn page_count(mut self, page_count: usize) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn max_soft(mut self, max_soft: usize) -> Self {
        self.max_soft = max_soft;
        self
    }

    /// Layout matching the geometry of `store`.
    pub fn for_store<S: PageStore>(store: &S) -> Self {
        Self::default()
            .page_size(store.page_size())
            .page_count(store.page_count())
    }

    pub fn soft_pages(&self) -> usize {
        self.max_soft.div_ceil(SOFT_PER_PAGE)
    }

    pub fn key_start_page(&self) -> usize {
        SOFT_START_PAGE + self.soft_pages()
    }

    pub fn key_page(&self, slot: usize) -> usize {
        self.key_start_page() + slot
    }

    /// Pages the database occupies.
    pub fn pages_required(&self) -> usize {
        self.max_keys + self.soft_pages() + 1 + 2
    }

    /// Check that every entry fits a page and every slot fits the store.
    pub fn check(&self) -> Result<()> {
        let largest = HEADER_SIZE
            .max(CARD_RECORD_SIZE)
            .max(SOFT_RECORD_SIZE * SOFT_PER_PAGE);
        if self.page_size <= largest {
            return Err(CardmanError::misconfigured(format!(
                "page size {} must exceed the largest entry ({largest} bytes)",
                self.page_size
            )));
        }
        if self.max_keys == 0 || self.max_keys > u8::MAX as usize {
            return Err(CardmanError::misconfigured(format!(
                "key capacity {} out of range 1-255",
                self.max_keys
            )));
        }
        if self.max_soft > u8::MAX as usize {
            return Err(CardmanError::misconfigured(format!(
                "software card capacity {} exceeds 255",
                self.max_soft
            )));
        }
        let required = self.page_size * self.pages_required();
        let capacity = self.page_size * self.page_count;
        if capacity < required {
            return Err(CardmanError::misconfigured(format!(
                "store holds {capacity} bytes, layout needs {required}"
            )));
        }
        Ok(())
    }

    /// [`check`](Self::check) plus agreement with the store geometry.
    pub fn check_store<S: PageStore>(&self, store: &S) -> Result<()> {
        self.check()?;
        if store.page_size() != self.page_size || store.page_count() < self.page_count {
            return Err(CardmanError::misconfigured(format!(
                "store has {} pages of {} bytes, layout expects {} of {}",
                store.page_count(),
                store.page_size(),
                self.page_count,
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Card slot as stored on a key or programming page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardRecord {
    pub used: bool,
    pub uid: Option<CardUid>,
}

impl CardRecord {
    pub fn encode(uid: &CardUid) -> [u8; CARD_RECORD_SIZE] {
        let mut bytes = [PADDING; CARD_RECORD_SIZE];
        bytes[0] = USED;
        bytes[1..1 + uid.len()].copy_from_slice(uid.as_bytes());
        bytes[CARD_RECORD_SIZE - 1] = uid.len() as u8;
        bytes
    }

    /// Decode the start of a page. A used slot whose length byte is out of
    /// range yields `uid: None`.
    pub fn decode(bytes: &[u8]) -> Self {
        let used = bytes[0] == USED;
        let uid = used
            .then(|| {
                let len = bytes[CARD_RECORD_SIZE - 1] as usize;
                (1..=MAX_UID_LENGTH).contains(&len).then(|| &bytes[1..1 + len])
            })
            .flatten()
            .and_then(|uid| CardUid::new(uid).ok());
        Self { used, uid }
    }
}

/// Software card entry; two share a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftRecord {
    pub card: CardRecord,
    pub function: SwFunction,
}

impl SoftRecord {
    pub fn encode(uid: &CardUid, function: SwFunction) -> [u8; SOFT_RECORD_SIZE] {
        let mut bytes = [PADDING; SOFT_RECORD_SIZE];
        bytes[..CARD_RECORD_SIZE].copy_from_slice(&CardRecord::encode(uid));
        bytes[CARD_RECORD_SIZE] = function.bits();
        bytes
    }

    /// Decode entry `index` of a soft page.
    pub fn decode(page: &[u8], index: usize) -> Self {
        let start = index * SOFT_RECORD_SIZE;
        let bytes = &page[start..start + SOFT_RECORD_SIZE];
        Self {
            card: CardRecord::decode(bytes),
            function: SwFunction::from_bits(bytes[CARD_RECORD_SIZE]),
        }
    }
}
