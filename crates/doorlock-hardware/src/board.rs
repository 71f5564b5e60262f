//! Peripheral bundle handed to the firmware.

use crate::door::DoorMonitor;
use crate::irq::{Irq, IrqFlags};
use crate::mock::{
    MemoryPageStore, MockBuzzer, MockBuzzerHandle, MockDoor, MockMotor, MockMotorHandle,
    MockRfid, MockRfidHandle, TokioRtc,
};
use crate::traits::{Buzzer, MotorBridge, PageStore, RfidScanner, RtcTimer};
use std::sync::Arc;
use std::time::Duration;

/// Concrete collaborator types of a target.
pub trait Board {
    type Store: PageStore;
    type Motor: MotorBridge;
    type Buzzer: Buzzer;
    type Rfid: RfidScanner;
    type Rtc: RtcTimer;
}

/// Every peripheral the firmware owns.
pub struct Peripherals<B: Board> {
    pub store: B::Store,
    pub motor: B::Motor,
    pub buzzer: B::Buzzer,
    pub rfid: B::Rfid,
    pub rtc: B::Rtc,
    pub door: Arc<DoorMonitor>,
    pub irq: Arc<IrqFlags>,
}

/// Hosted simulation target.
#[derive(Debug, Clone, Copy)]
pub struct MockBoard;

impl Board for MockBoard {
    type Store = MemoryPageStore;
    type Motor = MockMotor;
    type Buzzer = MockBuzzer;
    type Rfid = MockRfid;
    type Rtc = TokioRtc;
}

impl MockBoard {
    /// Build peripherals on `store` with the given door guard delay.
    pub fn build(store: MemoryPageStore, door_guard: Duration) -> (Peripherals<Self>, BoardHandle) {
        let irq = Arc::new(IrqFlags::new());
        let door = Arc::new(DoorMonitor::new(irq.clone(), door_guard));
        let (motor, motor_handle) = MockMotor::new();
        let (buzzer, buzzer_handle) = MockBuzzer::new();
        let (rfid, rfid_handle) = MockRfid::new(irq.clone());
        let rtc = TokioRtc::new(irq.clone());

        let handle = BoardHandle {
            store: store.clone(),
            motor: motor_handle,
            buzzer: buzzer_handle,
            rfid: rfid_handle,
            door: MockDoor::new(door.clone()),
            irq: irq.clone(),
        };
        let peripherals = Peripherals {
            store,
            motor,
            buzzer,
            rfid,
            rtc,
            door,
            irq,
        };
        (peripherals, handle)
    }
}

/// Test-side controls for a [`MockBoard`].
#[derive(Debug, Clone)]
pub struct BoardHandle {
    pub store: MemoryPageStore,
    pub motor: MockMotorHandle,
    pub buzzer: MockBuzzerHandle,
    pub rfid: MockRfidHandle,
    pub door: MockDoor,
    pub irq: Arc<IrqFlags>,
}

impl BoardHandle {
    /// Press the learn button. Ignored while the learn line is masked.
    pub fn press_learn(&self) {
        self.irq.raise(Irq::Learn);
    }
}
