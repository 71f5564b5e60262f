//! Persistent card database for the door lock.
//!
//! The database lives on a small page-organised non-volatile memory and
//! stores:
//!
//! - one programming card, used to enter programming mode
//! - up to six software cards, each selecting a software function
//! - up to fifty key cards, which operate the lock
//!
//! Seven factory cards (three software, four gym) are recognised without
//! being stored.
//!
//! # Crash Consistency
//!
//! The header holding the counts and the software function is written
//! alternately to two pages, tagged with a rotating state marker. A header
//! write torn by power loss leaves the other copy authoritative; see
//! [`header`] for the state table. Slot pages are written before the header,
//! and on load the slots themselves are the source of truth for the counts.
//!
//! # Examples
//!
//! ```
//! use doorlock_cardman::{CardDatabase, CardmanError};
//! use doorlock_core::{CardType, CardUid, SwFunction};
//! use doorlock_hardware::mock::MemoryPageStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryPageStore::new(32, 64);
//! let mut db = CardDatabase::open(store.clone())?;
//! db.initialize()?;
//!
//! let programming: CardUid = "de:ad:be:ef".parse()?;
//! db.set_programming_card(&programming)?;
//! db.set_software_function(SwFunction::LATCH)?;
//!
//! // re-open the same bytes, as after a power cycle
//! let mut db = CardDatabase::open(store)?;
//! db.initialize()?;
//! assert_eq!(db.classify(&programming), CardType::Programming);
//! assert_eq!(db.software_function(), SwFunction::LATCH);
//!
//! let error = db.add_key(&programming).unwrap_err();
//! assert!(matches!(error, CardmanError::AlreadyExists { .. }));
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod error;
pub mod header;
pub mod layout;

pub use database::CardDatabase;
pub use error::{CardmanError, Result};
pub use header::{CombinedState, HeaderSlot, HeaderState};
pub use layout::DatabaseLayout;
