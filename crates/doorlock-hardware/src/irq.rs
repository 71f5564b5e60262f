//! Interrupt flag set shared between interrupt sources and the main loop.
//!
//! Sources call [`IrqFlags::raise`]; the main loop inspects and clears flags
//! through an [`IrqGuard`], which holds the flag lock for its lifetime and is
//! the hosted equivalent of running with interrupts disabled.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::trace;

/// Interrupt lines the main loop cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Irq {
    /// Learn button pressed
    Learn,
    /// Door sensor edge
    Door,
    /// RTC overflow with interrupt enabled
    Rtc,
    /// RFID wake detector fired
    Rfid,
}

impl Irq {
    fn bit(self) -> u8 {
        match self {
            Irq::Learn => 1 << 0,
            Irq::Door => 1 << 1,
            Irq::Rtc => 1 << 2,
            Irq::Rfid => 1 << 3,
        }
    }
}

#[derive(Debug)]
struct IrqState {
    pending: u8,
    enabled: u8,
}

/// Pending and enabled interrupt lines.
#[derive(Debug)]
pub struct IrqFlags {
    state: Mutex<IrqState>,
    notify: Notify,
}

impl Default for IrqFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqFlags {
    /// All lines enabled, none pending.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IrqState {
                pending: 0,
                enabled: 0xff,
            }),
            notify: Notify::new(),
        }
    }

    /// Enter the critical section.
    pub fn lock(&self) -> IrqGuard<'_> {
        IrqGuard {
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Latch `irq` if its line is enabled and wake any sleeper.
    pub fn raise(&self, irq: Irq) {
        {
            let mut cs = self.lock();
            if cs.state.enabled & irq.bit() == 0 {
                trace!(?irq, "interrupt masked");
                return;
            }
            cs.state.pending |= irq.bit();
        }
        trace!(?irq, "interrupt raised");
        self.notify.notify_one();
    }

    /// Enable or mask a line. Masking also clears a pending flag.
    pub fn set_enabled(&self, irq: Irq, enabled: bool) {
        let mut cs = self.lock();
        if enabled {
            cs.state.enabled |= irq.bit();
        } else {
            cs.state.enabled &= !irq.bit();
            cs.state.pending &= !irq.bit();
        }
    }

    /// Test-and-clear a single flag.
    pub fn take(&self, irq: Irq) -> bool {
        self.lock().take(irq)
    }

    pub fn peek(&self, irq: Irq) -> bool {
        self.lock().peek(irq)
    }

    /// True if any flag is pending.
    pub fn any(&self) -> bool {
        self.lock().any()
    }

    /// Sleep until at least one flag is pending.
    ///
    /// A flag raised between the caller's last check and this call is not
    /// lost: `Notify` keeps the permit until the next wait.
    pub async fn wait(&self) {
        loop {
            if self.any() {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Sleep until `irq` is pending. Other flags stay pending.
    pub async fn wait_for(&self, irq: Irq) {
        loop {
            if self.peek(irq) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// Critical section over the flag set.
pub struct IrqGuard<'a> {
    state: MutexGuard<'a, IrqState>,
}

impl IrqGuard<'_> {
    pub fn take(&mut self, irq: Irq) -> bool {
        let set = self.state.pending & irq.bit() != 0;
        self.state.pending &= !irq.bit();
        set
    }

    pub fn peek(&self, irq: Irq) -> bool {
        self.state.pending & irq.bit() != 0
    }

    pub fn any(&self) -> bool {
        self.state.pending != 0
    }
}
