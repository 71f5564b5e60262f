//! Mock RFID transceiver.
//!
//! The handle places cards into and out of the antenna field. A card
//! entering the field while the wake detector is armed raises the RFID
//! interrupt, the same way a phase or capacitance shift would.

use crate::{
    HardwareError, Result,
    irq::{Irq, IrqFlags},
    traits::RfidScanner,
};
use doorlock_core::{CardUid, WakeDetection};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Time one anticollision scan takes.
pub const SCAN_DURATION: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct RfidState {
    field: Vec<CardUid>,
    wake_armed: Option<WakeDetection>,
    wake_fired: bool,
    failing_scans: u32,
    fail_initialize: bool,
    paused: bool,
    scans: u64,
}

/// Mock RFID reader.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use doorlock_core::CardUid;
/// use doorlock_hardware::irq::IrqFlags;
/// use doorlock_hardware::mock::MockRfid;
/// use doorlock_hardware::traits::RfidScanner;
///
/// #[tokio::main]
/// async fn main() -> doorlock_hardware::Result<()> {
///     let (mut reader, handle) = MockRfid::new(Arc::new(IrqFlags::new()));
///     handle.present(CardUid::from_array([0x04, 0xab, 0xcd, 0xef]));
///
///     let mut found = Vec::new();
///     reader.scan(1, 0, &mut |uid| found.push(*uid)).await?;
///     assert_eq!(found.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockRfid {
    state: Arc<Mutex<RfidState>>,
}

impl MockRfid {
    /// Create a reader and the handle that controls its field.
    pub fn new(irq: Arc<IrqFlags>) -> (Self, MockRfidHandle) {
        let state = Arc::new(Mutex::new(RfidState::default()));
        let handle = MockRfidHandle {
            state: state.clone(),
            irq,
        };
        (Self { state }, handle)
    }

    fn state(&self) -> MutexGuard<'_, RfidState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RfidScanner for MockRfid {
    fn initialize(&mut self) -> Result<()> {
        if self.state().fail_initialize {
            return Err(HardwareError::communication("RFID front end not responding"));
        }
        debug!("RFID front end initialized");
        Ok(())
    }

    async fn scan(
        &mut self,
        unit: u8,
        scan_id: u8,
        on_card: &mut dyn FnMut(&CardUid),
    ) -> Result<()> {
        tokio::time::sleep(SCAN_DURATION).await;

        let cards = {
            let mut state = self.state();
            state.scans += 1;
            if state.failing_scans > 0 {
                state.failing_scans -= 1;
                return Err(HardwareError::communication("anticollision failed"));
            }
            state.field.clone()
        };

        trace!(unit, scan_id, found = cards.len(), "scan complete");
        for uid in &cards {
            on_card(uid);
        }
        Ok(())
    }

    fn arm_wake_detector(&mut self, mode: WakeDetection) -> Result<()> {
        let mut state = self.state();
        state.wake_armed = Some(mode);
        state.wake_fired = false;
        trace!(?mode, "wake detector armed");
        Ok(())
    }

    fn disarm_wake_detector(&mut self) -> bool {
        let mut state = self.state();
        state.wake_armed = None;
        std::mem::take(&mut state.wake_fired)
    }

    fn pause(&mut self) {
        self.state().paused = true;
    }

    fn reinitialize(&mut self) -> Result<()> {
        self.state().paused = false;
        Ok(())
    }
}

/// Handle for controlling a mock RFID reader.
#[derive(Debug, Clone)]
pub struct MockRfidHandle {
    state: Arc<Mutex<RfidState>>,
    irq: Arc<IrqFlags>,
}

impl MockRfidHandle {
    fn state(&self) -> MutexGuard<'_, RfidState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring a card into the field.
    pub fn present(&self, uid: CardUid) {
        let wake = {
            let mut state = self.state();
            if state.field.contains(&uid) {
                return;
            }
            state.field.push(uid);
            if state.wake_armed.is_some() {
                state.wake_fired = true;
                true
            } else {
                false
            }
        };
        debug!(%uid, "card presented");
        if wake {
            self.irq.raise(Irq::Rfid);
        }
    }

    /// Take a card out of the field.
    pub fn remove(&self, uid: &CardUid) {
        self.state().field.retain(|c| c != uid);
        debug!(%uid, "card removed");
    }

    /// Empty the field.
    pub fn clear(&self) {
        self.state().field.clear();
    }

    /// Cards currently in the field.
    pub fn field(&self) -> Vec<CardUid> {
        self.state().field.clone()
    }

    /// Make the next `count` scans fail.
    pub fn fail_scans(&self, count: u32) {
        self.state().failing_scans = count;
    }

    /// Make `initialize` fail.
    pub fn fail_initialize(&self, fail: bool) {
        self.state().fail_initialize = fail;
    }

    pub fn wake_armed(&self) -> Option<WakeDetection> {
        self.state().wake_armed
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Number of scans run so far.
    pub fn scans(&self) -> u64 {
        self.state().scans
    }
}
