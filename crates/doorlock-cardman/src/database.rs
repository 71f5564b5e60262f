//! The card database.
//!
//! [`CardDatabase`] keeps an in-memory cache of every stored card and
//! writes through to a [`PageStore`]. Slot pages are written before the
//! header, so an interrupted update never leaves the header counting a slot
//! that was not written.

use crate::error::{CardmanError, Result};
use crate::header::{
    CombinedState, DB_VERSION_CURRENT, DB_VERSION_UNINITIALIZED, HEADER_SIZE, HeaderEntry,
    HeaderSlot, HeaderState,
};
use crate::layout::{
    CardRecord, DatabaseLayout, PROG_PAGE, SOFT_PER_PAGE, SOFT_RECORD_SIZE, SOFT_START_PAGE,
    SoftRecord,
};
use doorlock_core::constants::{DEFAULT_SOFTWARE_FUNCTION, FACTORY_CARDS};
use doorlock_core::{CardType, CardUid, SwFunction};
use doorlock_hardware::PageStore;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
struct KeyCard {
    uid: CardUid,
    slot: usize,
}

#[derive(Debug, Clone, Copy)]
struct SoftCard {
    uid: CardUid,
    function: SwFunction,
}

/// Persistent store of the programming card, software cards and keys.
///
/// # Examples
///
/// ```
/// use doorlock_cardman::CardDatabase;
/// use doorlock_core::{CardType, CardUid};
/// use doorlock_hardware::mock::MemoryPageStore;
///
/// let mut db = CardDatabase::open(MemoryPageStore::new(32, 64)).unwrap();
/// db.initialize().unwrap();
///
/// let uid: CardUid = "04:a2:19:c2".parse().unwrap();
/// db.add_key(&uid).unwrap();
/// assert_eq!(db.classify(&uid), CardType::Key { slot: 0 });
/// assert_eq!(db.key_count(), 1);
/// ```
#[derive(Debug)]
pub struct CardDatabase<S: PageStore> {
    store: S,
    layout: DatabaseLayout,
    header: HeaderEntry,
    combined: CombinedState,
    programming: Option<CardUid>,
    soft: Vec<SoftCard>,
    keys: Vec<KeyCard>,
}

impl<S: PageStore> CardDatabase<S> {
    /// Bind a database to `store`. Nothing is read until
    /// [`initialize`](Self::initialize).
    pub fn new(store: S, layout: DatabaseLayout) -> Result<Self> {
        layout.check_store(&store)?;
        Ok(Self {
            store,
            layout,
            header: HeaderEntry::formatted(DEFAULT_SOFTWARE_FUNCTION),
            combined: CombinedState::new(HeaderState::Fresh, HeaderState::Fresh),
            programming: None,
            soft: Vec::with_capacity(layout.max_soft),
            keys: Vec::with_capacity(layout.max_keys),
        })
    }

    /// Bind with the default capacities on the store's own geometry.
    pub fn open(store: S) -> Result<Self> {
        let layout = DatabaseLayout::for_store(&store);
        Self::new(store, layout)
    }

    /// Read the headers and load the cache.
    ///
    /// An erased store is formatted. A version 1 database whose slots
    /// cannot be trusted is formatted too. An undecodable header pair is
    /// returned as [`CardmanError::BadData`] for the caller to handle.
    pub fn initialize(&mut self) -> Result<()> {
        let (h1_state, h1) = self.read_header(HeaderSlot::H1)?;
        let (h2_state, h2) = self.read_header(HeaderSlot::H2)?;
        self.combined = CombinedState::new(h1_state, h2_state);

        let Some(slot) = self.combined.authoritative() else {
            return Err(CardmanError::bad_data(format!(
                "inconsistent header pair {}",
                self.combined
            )));
        };
        let header = match slot {
            HeaderSlot::H1 => h1,
            HeaderSlot::H2 => h2,
        };
        debug!(state = %self.combined, ?slot, version = header.db_version, "header read");

        match header.db_version {
            DB_VERSION_UNINITIALIZED => {
                info!("card database uninitialized, formatting");
                self.format()
            }
            DB_VERSION_CURRENT => {
                self.header = header;
                match self.load() {
                    Err(CardmanError::BadData(reason)) => {
                        error!(%reason, "card database corrupt, formatting");
                        self.format()
                    }
                    result => result,
                }
            }
            version => Err(CardmanError::UnsupportedVersion(version)),
        }
    }

    /// Erase every card and write a fresh header with the default software
    /// function.
    pub fn format(&mut self) -> Result<()> {
        for page in PROG_PAGE..self.layout.pages_required() {
            self.store.erase_page(page)?;
        }
        self.store.erase_page(HeaderSlot::H2.page())?;

        self.header = HeaderEntry::formatted(DEFAULT_SOFTWARE_FUNCTION);
        self.combined = CombinedState::new(HeaderState::Fresh, HeaderState::Fresh);
        self.write_header()?;

        self.programming = None;
        self.soft.clear();
        self.keys.clear();
        info!(software = %self.header.software_function, "card database formatted");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let (nkeys, nsoft) = (self.header.nkeys, self.header.nsoft);
        if nkeys as usize > self.layout.max_keys || nsoft as usize > self.layout.max_soft {
            return Err(CardmanError::bad_data(format!(
                "header counts {nkeys} keys and {nsoft} software cards"
            )));
        }

        let record = CardRecord::decode(&self.read(PROG_PAGE)?);
        if record.used && record.uid.is_none() {
            warn!(page = PROG_PAGE, "unreadable programming card ignored");
        }
        self.programming = record.uid;

        self.soft.clear();
        for index in 0..self.layout.max_soft {
            let page = SOFT_START_PAGE + index / SOFT_PER_PAGE;
            let record = SoftRecord::decode(&self.read(page)?, index % SOFT_PER_PAGE);
            match (record.card.used, record.card.uid) {
                (true, Some(uid)) => self.soft.push(SoftCard {
                    uid,
                    function: record.function,
                }),
                (true, None) => warn!(page, index, "unreadable software card ignored"),
                _ => {}
            }
        }

        self.keys.clear();
        for slot in 0..self.layout.max_keys {
            let page = self.layout.key_page(slot);
            let record = CardRecord::decode(&self.read(page)?);
            match (record.used, record.uid) {
                (true, Some(uid)) => self.keys.push(KeyCard { uid, slot }),
                (true, None) => warn!(page, slot, "unreadable key ignored"),
                _ => {}
            }
        }

        if self.keys.len() != nkeys as usize || self.soft.len() != nsoft as usize {
            warn!(
                header_keys = nkeys,
                stored_keys = self.keys.len(),
                header_soft = nsoft,
                stored_soft = self.soft.len(),
                "header counts disagree with stored slots, using stored slots"
            );
            self.header.nkeys = self.keys.len() as u8;
            self.header.nsoft = self.soft.len() as u8;
        }

        info!(
            keys = self.keys.len(),
            software_cards = self.soft.len(),
            programming = self.programming.is_some(),
            software = %self.header.software_function,
            "card database loaded"
        );
        Ok(())
    }

    /// Role of `uid`.
    ///
    /// Factory cards win over the programming card, which wins over stored
    /// software cards, which win over keys. Matching is exact.
    pub fn classify(&self, uid: &CardUid) -> CardType {
        if let Some((_, card_type)) = FACTORY_CARDS.iter().find(|(card, _)| card == uid) {
            return *card_type;
        }
        if self.programming.as_ref() == Some(uid) {
            return CardType::Programming;
        }
        if let Some(card) = self.soft.iter().find(|card| &card.uid == uid) {
            return CardType::Software(card.function);
        }
        if let Some(key) = self.keys.iter().find(|key| &key.uid == uid) {
            return CardType::Key {
                slot: key.slot as u8,
            };
        }
        CardType::Unknown
    }

    /// Enroll an unknown card as a key in the first free slot.
    pub fn add_key(&mut self, uid: &CardUid) -> Result<()> {
        match self.classify(uid) {
            CardType::Unknown => {}
            card_type => {
                return Err(CardmanError::AlreadyExists {
                    uid: *uid,
                    card_type,
                });
            }
        }
        if self.header.nkeys as usize >= self.layout.max_keys {
            return Err(CardmanError::Full {
                what: "key",
                capacity: self.layout.max_keys,
            });
        }

        for slot in 0..self.layout.max_keys {
            let page = self.layout.key_page(slot);
            if CardRecord::decode(&self.read(page)?).used {
                continue;
            }
            self.store.write_page(page, &CardRecord::encode(uid))?;
            self.keys.push(KeyCard { uid: *uid, slot });
            self.header.nkeys += 1;
            self.write_header()?;
            info!(%uid, slot, keys = self.header.nkeys, "key added");
            return Ok(());
        }

        Err(CardmanError::Corrupt {
            what: "key",
            count: self.header.nkeys,
        })
    }

    /// Remove a key and reload the cache. Unknown cards are ignored.
    pub fn delete_key(&mut self, uid: &CardUid) -> Result<()> {
        match self.classify(uid) {
            CardType::Key { slot } => {
                self.store
                    .erase_page(self.layout.key_page(slot as usize))?;
                self.header.nkeys = self.header.nkeys.saturating_sub(1);
                self.write_header()?;
                info!(%uid, slot, keys = self.header.nkeys, "key deleted");
                self.initialize()
            }
            CardType::Unknown => Ok(()),
            card_type => Err(CardmanError::NotAKey {
                uid: *uid,
                card_type,
            }),
        }
    }

    /// Drop every key. The header is written first; slots that survive an
    /// interruption are picked up again on the next load.
    pub fn delete_all_keys(&mut self) -> Result<()> {
        self.header.nkeys = 0;
        self.write_header()?;
        for slot in 0..self.layout.max_keys {
            self.store.erase_page(self.layout.key_page(slot))?;
        }
        self.keys.clear();
        info!("all keys deleted");
        Ok(())
    }

    /// Make `uid` the programming card, replacing the previous one.
    ///
    /// Keys and unknown cards are accepted; a key keeps its slot but is
    /// shadowed by the programming role.
    pub fn set_programming_card(&mut self, uid: &CardUid) -> Result<()> {
        match self.classify(uid) {
            CardType::Programming => Ok(()),
            CardType::Key { .. } | CardType::Unknown => {
                self.store.write_page(PROG_PAGE, &CardRecord::encode(uid))?;
                self.programming = Some(*uid);
                info!(%uid, "programming card set");
                Ok(())
            }
            card_type => Err(CardmanError::Rejected {
                uid: *uid,
                card_type,
            }),
        }
    }

    /// Store an unknown card as a software card selecting `function`.
    pub fn add_software_card(&mut self, uid: &CardUid, function: SwFunction) -> Result<()> {
        match self.classify(uid) {
            CardType::Unknown => {}
            card_type => {
                return Err(CardmanError::AlreadyExists {
                    uid: *uid,
                    card_type,
                });
            }
        }
        if self.header.nsoft as usize >= self.layout.max_soft {
            return Err(CardmanError::Full {
                what: "software card",
                capacity: self.layout.max_soft,
            });
        }

        for index in 0..self.layout.max_soft {
            let page = SOFT_START_PAGE + index / SOFT_PER_PAGE;
            let entry = index % SOFT_PER_PAGE;
            let mut bytes = self.read(page)?;
            if SoftRecord::decode(&bytes, entry).card.used {
                continue;
            }
            let start = entry * SOFT_RECORD_SIZE;
            bytes[start..start + SOFT_RECORD_SIZE]
                .copy_from_slice(&SoftRecord::encode(uid, function));
            self.store.write_page(page, &bytes)?;
            self.soft.push(SoftCard {
                uid: *uid,
                function,
            });
            self.header.nsoft += 1;
            self.write_header()?;
            info!(%uid, %function, "software card added");
            return Ok(());
        }

        Err(CardmanError::Corrupt {
            what: "software card",
            count: self.header.nsoft,
        })
    }

    pub fn software_function(&self) -> SwFunction {
        self.header.software_function
    }

    pub fn set_software_function(&mut self, function: SwFunction) -> Result<()> {
        self.header.software_function = function;
        self.write_header()
    }

    /// Gym auto-open delay in hours.
    pub fn open_delay(&self) -> u8 {
        self.header.open_delay
    }

    pub fn set_open_delay(&mut self, hours: u8) -> Result<()> {
        self.header.open_delay = hours;
        self.write_header()
    }

    /// Set both header fields with a single header write.
    pub fn set_software_function_and_open_delay(
        &mut self,
        function: SwFunction,
        hours: u8,
    ) -> Result<()> {
        self.header.software_function = function;
        self.header.open_delay = hours;
        self.write_header()
    }

    pub fn key_count(&self) -> u8 {
        self.header.nkeys
    }

    pub fn soft_card_count(&self) -> u8 {
        self.header.nsoft
    }

    pub fn programming_card(&self) -> Option<&CardUid> {
        self.programming.as_ref()
    }

    /// Enrolled keys with their slot index.
    pub fn keys(&self) -> impl Iterator<Item = (usize, &CardUid)> {
        self.keys.iter().map(|key| (key.slot, &key.uid))
    }

    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    /// Decoded markers of the two header copies.
    pub fn header_state(&self) -> CombinedState {
        self.combined
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn read(&self, page: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0; self.layout.page_size];
        self.store.read_page(page, &mut bytes)?;
        Ok(bytes)
    }

    fn read_header(&self, slot: HeaderSlot) -> Result<(HeaderState, HeaderEntry)> {
        let page = self.read(slot.page())?;
        let mut bytes = [0; HEADER_SIZE];
        bytes.copy_from_slice(&page[..HEADER_SIZE]);
        Ok((HeaderState::decode(bytes[0]), HeaderEntry::decode(&bytes)))
    }

    fn write_header(&mut self) -> Result<()> {
        let (slot, marker) = self.combined.next_write();
        self.store
            .write_page(slot.page(), &self.header.encode(marker))?;
        self.combined = self.combined.after_write(slot, marker);
        debug!(
            page = slot.page(),
            state = %self.combined,
            keys = self.header.nkeys,
            "header written"
        );
        Ok(())
    }
}
