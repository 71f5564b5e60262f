//! Mock motor with a simulated cam-driven bolt.
//!
//! The motor only turns one way; every `travel` of accumulated on-time flips
//! the bolt between retracted and extended. A jammed bolt never moves, and a
//! brownout is latched by the VCC monitor while it is running.

use crate::traits::MotorBridge;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Default on-time for one stroke.
pub const DEFAULT_TRAVEL: Duration = Duration::from_millis(300);

#[derive(Debug)]
struct MotorState {
    bolt_open: bool,
    on_since: Option<Instant>,
    accumulated: Duration,
    travel: Duration,
    jammed: bool,
    brownout: bool,
    monitoring: bool,
    vcc_low: bool,
    slave_output: bool,
    strokes: u32,
}

impl MotorState {
    fn advance(&mut self) {
        let Some(since) = self.on_since else {
            return;
        };
        let now = Instant::now();
        if !self.jammed {
            self.accumulated += now - since;
            while self.accumulated >= self.travel {
                self.accumulated -= self.travel;
                self.bolt_open = !self.bolt_open;
                self.strokes += 1;
                trace!(open = self.bolt_open, "bolt moved");
            }
        }
        self.on_since = Some(now);
    }

    fn sample_vcc(&mut self) {
        if self.monitoring && self.brownout {
            self.vcc_low = true;
        }
    }
}

/// Mock motor H-bridge.
#[derive(Debug)]
pub struct MockMotor {
    state: Arc<Mutex<MotorState>>,
}

impl MockMotor {
    /// Bolt starts extended (locked).
    pub fn new() -> (Self, MockMotorHandle) {
        Self::with_travel(DEFAULT_TRAVEL)
    }

    pub fn with_travel(travel: Duration) -> (Self, MockMotorHandle) {
        let state = Arc::new(Mutex::new(MotorState {
            bolt_open: false,
            on_since: None,
            accumulated: Duration::ZERO,
            travel,
            jammed: false,
            brownout: false,
            monitoring: false,
            vcc_low: false,
            slave_output: false,
            strokes: 0,
        }));
        (
            Self {
                state: state.clone(),
            },
            MockMotorHandle { state },
        )
    }

    fn state(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MotorBridge for MockMotor {
    fn set_motor(&mut self, on: bool) {
        let mut state = self.state();
        state.advance();
        state.on_since = on.then(Instant::now);
    }

    fn lock_sensor_open(&self) -> bool {
        let mut state = self.state();
        state.advance();
        state.bolt_open
    }

    fn start_vcc_monitor(&mut self) {
        let mut state = self.state();
        state.monitoring = true;
        state.sample_vcc();
    }

    fn stop_vcc_monitor(&mut self) {
        self.state().monitoring = false;
    }

    fn vcc_low(&self) -> bool {
        let mut state = self.state();
        state.sample_vcc();
        state.vcc_low
    }

    fn set_slave_output(&mut self, active: bool) {
        self.state().slave_output = active;
    }
}

/// Handle for driving and inspecting a mock motor.
#[derive(Debug, Clone)]
pub struct MockMotorHandle {
    state: Arc<Mutex<MotorState>>,
}

impl MockMotorHandle {
    fn state(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        let mut state = self.state();
        state.advance();
        state.bolt_open
    }

    pub fn is_running(&self) -> bool {
        self.state().on_since.is_some()
    }

    /// Place the bolt without driving the motor.
    pub fn set_open(&self, open: bool) {
        let mut state = self.state();
        state.bolt_open = open;
        state.accumulated = Duration::ZERO;
    }

    /// Block or free the bolt.
    pub fn jam(&self, jammed: bool) {
        let mut state = self.state();
        state.advance();
        state.jammed = jammed;
    }

    /// Sag the supply; the monitor latches it while running.
    pub fn set_brownout(&self, brownout: bool) {
        self.state().brownout = brownout;
    }

    /// Clear the latched brownout, as a fresh battery would.
    pub fn replace_battery(&self) {
        let mut state = self.state();
        state.brownout = false;
        state.vcc_low = false;
    }

    pub fn vcc_low_latched(&self) -> bool {
        self.state().vcc_low
    }

    pub fn slave_output(&self) -> bool {
        self.state().slave_output
    }

    /// Completed bolt movements.
    pub fn strokes(&self) -> u32 {
        self.state().strokes
    }
}
