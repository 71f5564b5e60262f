//! In-memory page store.
//!
//! Clones share the same bytes, so a test can drop a database, keep a clone
//! of its store and re-open it to simulate a power cycle.

use crate::{HardwareError, Result, traits::PageStore};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Value of an erased byte.
pub const ERASED: u8 = 0xff;

/// Storage operation recorded by [`MemoryPageStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Write(usize),
    Erase(usize),
}

#[derive(Debug)]
struct StoreState {
    bytes: Vec<u8>,
    log: Vec<StoreOp>,
    tear_next_write: Option<usize>,
}

/// Shared in-memory [`PageStore`] with fault injection.
///
/// # Examples
///
/// ```
/// use doorlock_hardware::mock::MemoryPageStore;
/// use doorlock_hardware::traits::PageStore;
///
/// let mut store = MemoryPageStore::new(32, 64);
/// store.write_page(3, &[1, 2, 3]).unwrap();
///
/// let mut page = [0u8; 32];
/// store.read_page(3, &mut page).unwrap();
/// assert_eq!(&page[..4], &[1, 2, 3, 0xff]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryPageStore {
    page_size: usize,
    page_count: usize,
    state: Arc<Mutex<StoreState>>,
}

impl MemoryPageStore {
    /// Create a fully erased store.
    pub fn new(page_size: usize, page_count: usize) -> Self {
        Self {
            page_size,
            page_count,
            state: Arc::new(Mutex::new(StoreState {
                bytes: vec![ERASED; page_size * page_count],
                log: Vec::new(),
                tear_next_write: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, page: usize) -> Result<()> {
        if page >= self.page_count {
            return Err(HardwareError::PageOutOfRange {
                page,
                count: self.page_count,
            });
        }
        Ok(())
    }

    /// Make the next write lose power after `bytes` bytes.
    ///
    /// The first byte of the torn page is left as garbage, which is what a
    /// half-programmed state marker decodes to.
    pub fn tear_next_write(&self, bytes: usize) {
        self.state().tear_next_write = Some(bytes);
    }

    /// Every write and erase since creation or the last [`clear_log`].
    ///
    /// [`clear_log`]: MemoryPageStore::clear_log
    pub fn log(&self) -> Vec<StoreOp> {
        self.state().log.clone()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Copy of a page, for assertions.
    pub fn page(&self, page: usize) -> Vec<u8> {
        let start = page * self.page_size;
        self.state().bytes[start..start + self.page_size].to_vec()
    }

    /// Overwrite raw bytes of a page without logging.
    pub fn poke(&self, page: usize, offset: usize, data: &[u8]) {
        let start = page * self.page_size + offset;
        self.state().bytes[start..start + data.len()].copy_from_slice(data);
    }

    /// Snapshot of the whole medium.
    pub fn snapshot(&self) -> Vec<u8> {
        self.state().bytes.clone()
    }
}

impl PageStore for MemoryPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<()> {
        self.check(page)?;
        if buf.len() != self.page_size {
            return Err(HardwareError::invalid_data(format!(
                "read buffer is {} bytes, page is {}",
                buf.len(),
                self.page_size
            )));
        }
        let start = page * self.page_size;
        buf.copy_from_slice(&self.state().bytes[start..start + self.page_size]);
        Ok(())
    }

    fn write_page(&mut self, page: usize, data: &[u8]) -> Result<()> {
        self.check(page)?;
        if data.len() > self.page_size {
            return Err(HardwareError::invalid_data(format!(
                "write of {} bytes exceeds page size {}",
                data.len(),
                self.page_size
            )));
        }

        let page_size = self.page_size;
        let mut state = self.state();
        let start = page * page_size;
        let page_bytes = &mut state.bytes[start..start + page_size];
        page_bytes.fill(ERASED);

        match state.tear_next_write.take() {
            Some(written) => {
                let written = written.min(data.len());
                let page_bytes = &mut state.bytes[start..start + page_size];
                page_bytes[..written].copy_from_slice(&data[..written]);
                page_bytes[0] = 0x13;
            }
            None => {
                state.bytes[start..start + data.len()].copy_from_slice(data);
            }
        }
        state.log.push(StoreOp::Write(page));
        Ok(())
    }

    fn erase_page(&mut self, page: usize) -> Result<()> {
        self.check(page)?;
        let start = page * self.page_size;
        let mut state = self.state();
        state.bytes[start..start + self.page_size].fill(ERASED);
        state.log.push(StoreOp::Erase(page));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_erased() {
        let store = MemoryPageStore::new(16, 4);
        assert!(store.snapshot().iter().all(|b| *b == ERASED));
    }

    #[test]
    fn test_clones_share_bytes() {
        let mut store = MemoryPageStore::new(16, 4);
        let other = store.clone();
        store.write_page(1, &[0xaa]).unwrap();
        assert_eq!(other.page(1)[0], 0xaa);
    }

    #[test]
    fn test_out_of_range_page() {
        let mut store = MemoryPageStore::new(16, 4);
        assert!(matches!(
            store.erase_page(4),
            Err(HardwareError::PageOutOfRange { page: 4, count: 4 })
        ));
    }

    #[test]
    fn test_torn_write_leaves_garbage_marker() {
        let mut store = MemoryPageStore::new(16, 4);
        store.tear_next_write(3);
        store.write_page(0, &[0xaa, 1, 0, 7, 7, 7]).unwrap();

        let page = store.page(0);
        assert_eq!(page[0], 0x13);
        assert_eq!(&page[1..3], &[1, 0]);
        assert_eq!(page[3], ERASED);

        // only one write is torn
        store.write_page(0, &[0xaa]).unwrap();
        assert_eq!(store.page(0)[0], 0xaa);
    }

    #[test]
    fn test_log_records_operations() {
        let mut store = MemoryPageStore::new(16, 4);
        store.write_page(2, &[1]).unwrap();
        store.erase_page(3).unwrap();
        assert_eq!(store.log(), vec![StoreOp::Write(2), StoreOp::Erase(3)]);
    }
}
