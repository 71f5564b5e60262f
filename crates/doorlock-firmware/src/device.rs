//! Everything the main loop drives, owned in one place.

use std::sync::Arc;

use doorlock_cardman::{CardDatabase, DatabaseLayout};
use doorlock_core::{CardType, CardUid, FirmwareConfig, SwFunction};
use doorlock_hardware::{
    Board, Buzzer, DoorMonitor, Irq, IrqFlags, Peripherals, Result as HwResult, RfidScanner,
    RtcTimer, Signal,
};
use tracing::{trace, warn};

use crate::door::is_door_closed;
use crate::error::Result;
use crate::motor::MotorController;

/// RFID unit scanned by the lock.
const RFID_UNIT: u8 = 1;

/// Outcome of one anticollision scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    /// Cards seen, saturating
    pub found: u8,
    /// Last card seen
    pub card: Option<CardUid>,
    pub card_type: CardType,
}

impl Default for ScanResult {
    fn default() -> Self {
        Self {
            found: 0,
            card: None,
            card_type: CardType::Unknown,
        }
    }
}

impl ScanResult {
    fn record(&mut self, uid: &CardUid, card_type: CardType) {
        self.found = self.found.saturating_add(1);
        self.card = Some(*uid);
        self.card_type = card_type;
    }

    /// The card, if exactly one was in the field.
    pub fn single(&self) -> Option<(CardUid, CardType)> {
        match (self.found, self.card) {
            (1, Some(uid)) => Some((uid, self.card_type)),
            _ => None,
        }
    }
}

/// Peripherals, motor control and the card database of one lock.
pub struct Device<B: Board> {
    pub motor: MotorController<B::Motor>,
    pub buzzer: B::Buzzer,
    pub rfid: B::Rfid,
    pub rtc: B::Rtc,
    pub door: Arc<DoorMonitor>,
    pub irq: Arc<IrqFlags>,
    pub cards: CardDatabase<B::Store>,
    pub config: FirmwareConfig,
    scan_id: u8,
}

impl<B: Board> Device<B> {
    /// Bind the peripherals. The card database is not read yet.
    pub fn new(
        peripherals: Peripherals<B>,
        layout: DatabaseLayout,
        config: FirmwareConfig,
    ) -> Result<Self> {
        let cards = CardDatabase::new(peripherals.store, layout)?;
        Ok(Self {
            motor: MotorController::new(peripherals.motor, config.timeouts.motor),
            buzzer: peripherals.buzzer,
            rfid: peripherals.rfid,
            rtc: peripherals.rtc,
            door: peripherals.door,
            irq: peripherals.irq,
            cards,
            config,
            scan_id: 0,
        })
    }

    pub fn software_function(&self) -> SwFunction {
        self.cards.software_function()
    }

    /// Slave output enabled by the current software function.
    pub fn slave_mode(&self) -> bool {
        self.software_function().contains(SwFunction::SLAVE)
    }

    pub async fn open_lock(&mut self, slave_mode: bool) -> HwResult<()> {
        let latch = self.software_function().contains(SwFunction::LATCH);
        self.motor
            .open_lock(&mut self.rtc, &mut self.buzzer, slave_mode, latch)
            .await
    }

    pub async fn close_lock(&mut self, slave_mode: bool) -> HwResult<()> {
        let latch = self.software_function().contains(SwFunction::LATCH);
        self.motor
            .close_lock(&mut self.rtc, &mut self.buzzer, slave_mode, latch)
            .await
    }

    pub fn is_lock_open(&self) -> bool {
        self.motor.is_lock_open()
    }

    /// Play `signal` once and wait for it to finish.
    pub async fn play(&mut self, signal: Signal) {
        self.buzzer.play(signal, false);
        self.buzzer.wait_until_finished().await;
    }

    pub async fn is_door_closed(&self) -> bool {
        is_door_closed(
            self.door.as_ref(),
            self.config.door_checks,
            self.config.door_check_interval(),
        )
        .await
    }

    /// Scan once and classify what was found. A failed scan counts as an
    /// empty field.
    pub async fn scan(&mut self) -> ScanResult {
        let mut result = ScanResult::default();
        let cards = &self.cards;
        let scan_id = self.scan_id;
        self.scan_id = self.scan_id.wrapping_add(1);

        let outcome = self
            .rfid
            .scan(RFID_UNIT, scan_id, &mut |uid| {
                let card_type = cards.classify(uid);
                trace!(%uid, %card_type, "card in field");
                result.record(uid, card_type);
            })
            .await;

        if let Err(e) = outcome {
            warn!(error = %e, "scan failed");
            return ScanResult::default();
        }
        result
    }

    /// Sleep until the RTC interrupt fires, then consume it.
    pub async fn wait_for_rtc_interrupt(&mut self) {
        while !self.rtc.poll_interrupt() {
            self.irq.wait_for(Irq::Rtc).await;
        }
    }
}
