//! Deployment-specific behavior on top of the main loop.
//!
//! The active [`SwFunction`] flags decide how the lock reacts to a handful
//! of [`Trigger`]s fired by the main loop. The engine never runs on its own;
//! it owns the alarm sub-state and the gym relock countdown and mutates them
//! only from [`SoftwareFunctionEngine::trigger`] and the gym callbacks.
//!
//! | Flag  | Key presented                         |
//! |-------|---------------------------------------|
//! | none  | open, wait, close                     |
//! | ALARM | as none, or silence a running alarm   |
//! | LATCH | toggle the bolt                       |
//! | GYM   | handled by [`SoftwareFunctionEngine::gym_card`] |
//!
//! SLAVE only mirrors the bolt on the slave output.

use std::fmt;

use doorlock_core::{CardType, CardUid, SwFunction};
use doorlock_hardware::{Board, Buzzer, Result as HwResult, RtcTimer, Signal};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::device::Device;

/// Intrusion alarm sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Off,
    /// Door found open, first alarm scheduled
    ArmedPendingFirstAlarm,
    ArmedRepeating,
    /// Silenced by a key until the door closes
    Disabled,
}

/// Gym locker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GymState {
    Open,
    Locked {
        /// Ticks left until the locker opens by itself
        remaining: u32,
        /// Card that locked it
        card: CardUid,
    },
}

/// Events the main loop reports to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Init,
    Deinit,
    Key,
    Door,
    Rtc,
    KeyCountChanged,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Init => "init",
            Trigger::Deinit => "deinit",
            Trigger::Key => "key",
            Trigger::Door => "door",
            Trigger::Rtc => "rtc",
            Trigger::KeyCountChanged => "key count changed",
        };
        f.write_str(name)
    }
}

/// Motor failures are already logged and announced by the controller.
fn log_motor(operation: &str, result: HwResult<()>) {
    if let Err(e) = result {
        debug!(operation, error = %e, "motor operation failed");
    }
}

/// Alarm and gym state plus the trigger dispatch.
#[derive(Debug)]
pub struct SoftwareFunctionEngine {
    alarm: AlarmState,
    gym: GymState,
}

impl Default for SoftwareFunctionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareFunctionEngine {
    pub fn new() -> Self {
        Self {
            alarm: AlarmState::Off,
            gym: GymState::Open,
        }
    }

    pub fn alarm(&self) -> AlarmState {
        self.alarm
    }

    pub fn gym(&self) -> GymState {
        self.gym
    }

    /// React to `trigger` under the current software function.
    pub async fn trigger<B: Board>(&mut self, device: &mut Device<B>, trigger: Trigger) {
        debug!(%trigger, function = %device.software_function(), "software trigger");
        match trigger {
            Trigger::Init => self.init(device).await,
            Trigger::Deinit => {
                device.rtc.stop();
                device.rtc.poll_interrupt();
            }
            Trigger::Key => self.key(device).await,
            Trigger::Door => {
                if device.is_door_closed().await {
                    info!("door closed");
                } else {
                    info!("door opened");
                }
            }
            Trigger::Rtc => self.rtc(device).await,
            Trigger::KeyCountChanged => self.keys_changed(device).await,
        }
    }

    async fn init<B: Board>(&mut self, device: &mut Device<B>) {
        let function = device.software_function();
        self.gym = GymState::Open;
        self.keys_changed(device).await;
        if function.contains(SwFunction::ALARM) {
            self.alarm = AlarmState::Off;
            self.check_alarm(device).await;
        }
        let open = device.is_lock_open();
        device
            .motor
            .set_slave_lock(open, function.contains(SwFunction::SLAVE));
    }

    /// Bring the bolt in line with the key count. An empty lock is always
    /// open; latch mode keeps its position otherwise.
    async fn keys_changed<B: Board>(&mut self, device: &mut Device<B>) {
        let function = device.software_function();
        let slave = device.slave_mode();
        if device.cards.key_count() == 0 {
            log_motor("open", device.open_lock(slave).await);
        } else if function.contains(SwFunction::GYM) {
            log_motor("open", device.open_lock(slave).await);
        } else if !function.contains(SwFunction::LATCH) {
            log_motor("close", device.close_lock(slave).await);
        }
    }

    async fn key<B: Board>(&mut self, device: &mut Device<B>) {
        let function = device.software_function();
        let slave = device.slave_mode();

        if function.contains(SwFunction::ALARM) {
            if self.alarm == AlarmState::ArmedRepeating {
                info!("alarm silenced");
                self.alarm = AlarmState::Disabled;
                device.rtc.stop();
                device.rtc.poll_interrupt();
            } else {
                self.open_door(device, slave).await;
                self.alarm = AlarmState::Off;
            }
        } else if function.contains(SwFunction::LATCH) {
            if device.is_lock_open() {
                log_motor("close", device.close_lock(slave).await);
            } else {
                log_motor("open", device.open_lock(slave).await);
            }
        } else if function.contains(SwFunction::GYM) {
            warn!("key trigger in gym mode");
        } else {
            self.open_door(device, slave).await;
        }
    }

    /// Momentary unlock: open, hold for the open window, close.
    async fn open_door<B: Board>(&mut self, device: &mut Device<B>, slave: bool) {
        if let Err(e) = device.open_lock(slave).await {
            debug!(error = %e, "not holding the lock open");
            return;
        }
        device.rtc.poll_interrupt();
        device
            .rtc
            .start_with_interrupt(device.config.timeouts.lock_open_wait);
        device.wait_for_rtc_interrupt().await;
        log_motor("close", device.close_lock(slave).await);
    }

    async fn rtc<B: Board>(&mut self, device: &mut Device<B>) {
        device.rtc.stop();
        device.rtc.poll_interrupt();

        if !device.software_function().contains(SwFunction::ALARM) {
            debug!("RTC trigger without alarm");
            return;
        }
        if device.is_door_closed().await {
            return;
        }

        match self.alarm {
            AlarmState::Off | AlarmState::Disabled => return,
            AlarmState::ArmedPendingFirstAlarm => {
                warn!("door left open, alarm");
                self.alarm = AlarmState::ArmedRepeating;
                device.buzzer.play(Signal::FirstAlarm, false);
            }
            AlarmState::ArmedRepeating => {
                device.buzzer.play(Signal::RepeatedAlarm, false);
            }
        }

        while device.buzzer.is_running() {
            if device.is_door_closed().await {
                info!("door closed, alarm off");
                self.alarm = AlarmState::Off;
                return;
            }
            if let Some((uid, CardType::Key { .. })) = device.scan().await.single() {
                info!(%uid, "alarm silenced by key");
                self.alarm = AlarmState::Disabled;
                device.play(Signal::Positive).await;
                return;
            }
        }

        device
            .rtc
            .start_with_interrupt(device.config.timeouts.repeating_alarm);
    }

    /// Arm or disarm the alarm from the door and the key count.
    pub async fn check_alarm<B: Board>(&mut self, device: &mut Device<B>) {
        if !device.software_function().contains(SwFunction::ALARM) {
            return;
        }

        if device.cards.key_count() == 0 {
            if self.alarm != AlarmState::Off {
                self.alarm = AlarmState::Off;
                device.rtc.stop();
                device.rtc.poll_interrupt();
            }
            return;
        }

        if device.is_door_closed().await {
            match self.alarm {
                AlarmState::ArmedPendingFirstAlarm | AlarmState::ArmedRepeating => {
                    device.rtc.stop();
                    device.rtc.poll_interrupt();
                    self.alarm = AlarmState::Off;
                    debug!("alarm disarmed");
                }
                AlarmState::Disabled => self.alarm = AlarmState::Off,
                AlarmState::Off => {}
            }
        } else if self.alarm == AlarmState::Off {
            self.alarm = AlarmState::ArmedPendingFirstAlarm;
            device
                .rtc
                .start_with_interrupt(device.config.timeouts.first_alarm);
            info!(seconds = device.config.timeouts.first_alarm, "alarm armed");
        }
    }

    /// Restart the first-alarm countdown after a mode used the RTC.
    pub fn restart_alarm<B: Board>(&mut self, device: &mut Device<B>) {
        if !device.software_function().contains(SwFunction::ALARM) {
            return;
        }
        match self.alarm {
            AlarmState::ArmedRepeating | AlarmState::ArmedPendingFirstAlarm => {
                self.alarm = AlarmState::ArmedPendingFirstAlarm;
                device
                    .rtc
                    .start_with_interrupt(device.config.timeouts.first_alarm);
            }
            AlarmState::Off | AlarmState::Disabled => {}
        }
    }

    /// A card presented while the gym function is active.
    pub async fn gym_card<B: Board>(
        &mut self,
        device: &mut Device<B>,
        uid: CardUid,
        card_type: CardType,
    ) {
        match (card_type, self.gym) {
            (CardType::Programming, GymState::Locked { .. }) => {
                info!("gym locker opened by programming card");
                self.gym = GymState::Open;
                log_motor("open", device.open_lock(true).await);
                device.play(Signal::Positive).await;
            }
            (CardType::Programming | CardType::Software(_) | CardType::GymSoftware(_), _) => {
                device.play(Signal::Error).await;
            }
            (_, GymState::Open) => {
                if !device.is_door_closed().await {
                    debug!("gym locker door not closed");
                    device.play(Signal::Error).await;
                    return;
                }
                log_motor("close", device.close_lock(true).await);
                device.play(Signal::Positive).await;

                let hours = device.cards.open_delay() as u32;
                let step = device.config.gym_tick_secs.max(1);
                let remaining = if hours > 0 {
                    device.rtc.poll_interrupt();
                    device.rtc.start_with_interrupt(step);
                    hours * 3600 / step as u32
                } else {
                    0
                };
                info!(%uid, remaining, "gym locker locked");
                self.gym = GymState::Locked {
                    remaining,
                    card: uid,
                };
            }
            (_, GymState::Locked { card, .. }) if card == uid => {
                info!(%uid, "gym locker opened");
                log_motor("open", device.open_lock(true).await);
                device.play(Signal::Positive).await;
                self.gym = GymState::Open;
            }
            (_, GymState::Locked { .. }) => {
                debug!(%uid, "gym locker held by another card");
                device.play(Signal::Negative).await;
            }
        }
    }

    /// One relock tick. The locker opens when the countdown runs out.
    pub async fn gym_rtc<B: Board>(&mut self, device: &mut Device<B>) {
        let GymState::Locked { remaining, card } = self.gym else {
            return;
        };
        if remaining == 0 {
            debug!("gym locker has no open delay");
            return;
        }

        let remaining = remaining - 1;
        if remaining == 0 {
            info!(%card, "gym open delay elapsed");
            self.gym = GymState::Open;
            log_motor("open", device.open_lock(true).await);
            device.play(Signal::Positive).await;
        } else {
            self.gym = GymState::Locked { remaining, card };
            device.rtc.poll_interrupt();
            device.rtc.start_with_interrupt(device.config.gym_tick_secs.max(1));
        }
    }
}
