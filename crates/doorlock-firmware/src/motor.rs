//! Lock motor control.
//!
//! The motor turns in one direction only; a cam converts rotation into bolt
//! travel, so opening and closing are the same movement stopped at a
//! different position of the lock contact. The motor is driven in short
//! bursts with the supply monitor running, bounded by an RTC window.
//!
//! A brownout while closing re-opens the lock. With a weak battery the
//! bolt is left retracted rather than risk locking someone out.

use std::time::Duration;

use doorlock_hardware::{Buzzer, HardwareError, MotorBridge, Result, RtcTimer, Signal};
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

/// On-time of one drive burst.
pub const PWM_BURST: Duration = Duration::from_millis(20);

/// Lock contact poll interval inside a burst.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Each half of the start pulse; the supply monitor runs during the second.
const START_PULSE: Duration = Duration::from_millis(40);

/// Bolt drive with the slave lock output.
#[derive(Debug)]
pub struct MotorController<M> {
    bridge: M,
    timeout_secs: u8,
}

impl<M: MotorBridge> MotorController<M> {
    /// Controller giving each stroke `timeout_secs` to reach its position.
    pub fn new(bridge: M, timeout_secs: u8) -> Self {
        Self {
            bridge,
            timeout_secs,
        }
    }

    pub fn is_lock_open(&self) -> bool {
        self.bridge.lock_sensor_open()
    }

    /// Latched supply brownout.
    pub fn vcc_low(&self) -> bool {
        self.bridge.vcc_low()
    }

    /// Drive the slave output: active while open, and only in slave mode.
    pub fn set_slave_lock(&mut self, open: bool, slave_mode: bool) {
        self.bridge.set_slave_output(open && slave_mode);
    }

    pub fn bridge(&self) -> &M {
        &self.bridge
    }

    /// Retract the bolt.
    ///
    /// Latch mode implies slave mode. An already open lock is left alone,
    /// including the slave output. A latched brownout is announced with the
    /// VCC low tone even if the stroke itself succeeded.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Timeout`] if the contact did not report open within
    /// the window, [`HardwareError::VccLow`] if the supply sagged during the
    /// stroke.
    pub async fn open_lock(
        &mut self,
        rtc: &mut impl RtcTimer,
        buzzer: &mut impl Buzzer,
        slave_mode: bool,
        latch_mode: bool,
    ) -> Result<()> {
        let slave_mode = slave_mode || latch_mode;
        if self.is_lock_open() {
            trace!("lock already open");
            return Ok(());
        }

        debug!(slave_mode, "opening lock");
        let result = self.stroke(rtc, true).await;
        rtc.stop();
        self.set_slave_lock(true, slave_mode);

        if self.bridge.vcc_low() {
            warn!("VCC low after opening");
            buzzer.play(Signal::VccLow, false);
            buzzer.wait_until_finished().await;
        }
        if let Err(HardwareError::Timeout { .. }) = result {
            warn!("motor timeout while opening");
        }
        result
    }

    /// Extend the bolt.
    ///
    /// In latch mode the slave output is released before anything else. A
    /// closed lock is left alone. With the supply already known to be low
    /// the motor is not started at all; a brownout during the stroke
    /// re-opens the lock.
    pub async fn close_lock(
        &mut self,
        rtc: &mut impl RtcTimer,
        buzzer: &mut impl Buzzer,
        slave_mode: bool,
        latch_mode: bool,
    ) -> Result<()> {
        let mut slave_mode = slave_mode;
        if latch_mode {
            slave_mode = true;
            self.set_slave_lock(false, true);
        }
        if !self.is_lock_open() {
            trace!("lock already closed");
            return Ok(());
        }
        if self.bridge.vcc_low() {
            warn!("VCC low, refusing to close");
            buzzer.play(Signal::VccLow, false);
            buzzer.wait_until_finished().await;
            return Err(HardwareError::vcc_low("close"));
        }

        debug!(slave_mode, "closing lock");
        let result = self.stroke(rtc, false).await;
        rtc.stop();
        self.set_slave_lock(false, slave_mode);

        if self.bridge.vcc_low() {
            warn!("VCC low while closing, re-opening");
            if let Err(e) = self.open_lock(rtc, buzzer, slave_mode, false).await {
                warn!(error = %e, "re-open failed");
            }
            return Err(HardwareError::vcc_low("close"));
        }
        if let Err(HardwareError::Timeout { .. }) = result {
            warn!("motor timeout while closing");
        }
        result
    }

    async fn stroke(&mut self, rtc: &mut impl RtcTimer, open: bool) -> Result<()> {
        rtc.start(self.timeout_secs);

        self.bridge.set_motor(true);
        sleep(START_PULSE).await;
        self.bridge.start_vcc_monitor();
        sleep(START_PULSE).await;
        self.bridge.stop_vcc_monitor();
        self.bridge.set_motor(false);

        let result = self.drive(rtc, open).await;
        self.bridge.stop_vcc_monitor();
        self.bridge.set_motor(false);
        result
    }

    async fn drive(&mut self, rtc: &mut impl RtcTimer, open: bool) -> Result<()> {
        let operation = if open { "open" } else { "close" };
        let mut result = Ok(());

        'drive: loop {
            if self.bridge.lock_sensor_open() == open {
                break;
            }
            self.bridge.set_motor(true);
            self.bridge.start_vcc_monitor();
            let burst_end = Instant::now() + PWM_BURST;
            while Instant::now() < burst_end {
                sleep(POLL_INTERVAL).await;
                // keep driving on a brownout, the bolt must not stop halfway
                if self.bridge.vcc_low() {
                    result = Err(HardwareError::vcc_low(operation));
                }
                if rtc.is_finished() {
                    result = Err(HardwareError::timeout(self.timeout_secs as u64 * 1000));
                    break 'drive;
                }
                if self.bridge.lock_sensor_open() == open {
                    break 'drive;
                }
            }
            self.bridge.stop_vcc_monitor();
            self.bridge.set_motor(false);
        }
        result
    }
}
