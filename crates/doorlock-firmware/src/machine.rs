//! The main control loop.
//!
//! [`MainStateMachine::step`] runs the body of the current state once and
//! moves to the next. Bodies either finish immediately or block on the
//! buzzer, the RTC or an interrupt; the loop sleeps whenever nothing is
//! pending.
//!
//! Interactive states (learn mode, programming modes) stay in place while
//! their RTC window runs and rescan on every pass.

use std::time::Duration;

use doorlock_core::{CardType, CardUid, GymVariant, SwFunction};
use doorlock_hardware::{Board, Buzzer, Irq, RfidScanner, RtcTimer, Signal};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, trace, warn};

use crate::device::Device;
use crate::error::Result;
use crate::software::{SoftwareFunctionEngine, Trigger};
use crate::state::{MainState, StateTracker};

/// Pause after a learn window closes or a programming card commit.
const LEARN_EXIT_DELAY: Duration = Duration::from_millis(500);

/// Pause after the all-deleted tone.
const ALL_DELETED_DELAY: Duration = Duration::from_millis(200);

/// Pause after the wake-up chirp.
const WAKE_CHIRP_DELAY: Duration = Duration::from_millis(70);

/// Field settle time before the wake-up scan.
const WAKE_SCAN_DELAY: Duration = Duration::from_millis(10);

/// Rescan period while a card is being held.
const HOLD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of one pass of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The lock asked for a reset to apply a new configuration
    Reset,
    /// Deep sleep reached the run deadline
    Halted,
}

/// Why [`MainStateMachine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    ResetRequested,
    DeadlineReached,
}

/// Main loop of the lock.
pub struct MainStateMachine<B: Board> {
    device: Device<B>,
    engine: SoftwareFunctionEngine,
    states: StateTracker,
    bad_detection_counter: u8,
    wake_counter: u32,
    deadline: Option<Instant>,
}

impl<B: Board> MainStateMachine<B> {
    /// Machine at [`MainState::Initialize`] on an initialized device.
    pub fn new(device: Device<B>) -> Self {
        Self {
            device,
            engine: SoftwareFunctionEngine::new(),
            states: StateTracker::new(),
            bad_detection_counter: 0,
            wake_counter: 0,
            deadline: None,
        }
    }

    pub fn state(&self) -> MainState {
        self.states.current()
    }

    pub fn states(&self) -> &StateTracker {
        &self.states
    }

    pub fn device(&self) -> &Device<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<B> {
        &mut self.device
    }

    pub fn engine(&self) -> &SoftwareFunctionEngine {
        &self.engine
    }

    /// Wake-ups since power-up.
    pub fn wake_counter(&self) -> u32 {
        self.wake_counter
    }

    /// Consecutive wake-ups that found no card.
    pub fn bad_detection_counter(&self) -> u8 {
        self.bad_detection_counter
    }

    pub fn into_device(self) -> Device<B> {
        self.device
    }

    /// Run until the lock requests a reset.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.deadline = None;
        self.run_loop().await
    }

    /// Run until the lock requests a reset or would sleep past `deadline`.
    ///
    /// The deadline is only checked in deep sleep; a running interaction
    /// always completes.
    pub async fn run_until(&mut self, deadline: Instant) -> Result<RunOutcome> {
        self.deadline = Some(deadline);
        let outcome = self.run_loop().await;
        self.deadline = None;
        outcome
    }

    async fn run_loop(&mut self) -> Result<RunOutcome> {
        loop {
            match self.step().await? {
                Step::Continue => {}
                Step::Reset => return Ok(RunOutcome::ResetRequested),
                Step::Halted => return Ok(RunOutcome::DeadlineReached),
            }
        }
    }

    fn go(&mut self, next: MainState) -> Result<Step> {
        if next != self.states.current() {
            let transition = self.states.transition_to(next)?;
            trace!(from = %transition.from, to = %transition.to, "main state");
        }
        Ok(Step::Continue)
    }

    /// Execute the current state once.
    pub async fn step(&mut self) -> Result<Step> {
        match self.states.current() {
            MainState::Initialize => {
                self.device.door.initialize();
                self.engine.trigger(&mut self.device, Trigger::Init).await;
                self.go(MainState::PrepareWakeUp)
            }
            MainState::PrepareWakeUp => {
                self.device.irq.set_enabled(Irq::Learn, true);
                let mode = self.device.config.wake_detection;
                if let Err(e) = self.device.rfid.arm_wake_detector(mode) {
                    warn!(error = %e, "wake detector not armed");
                }
                self.device.buzzer.stop();
                self.go(MainState::DeepSleep)
            }
            MainState::DeepSleep => self.deep_sleep().await,
            MainState::WokenUp => self.woken_up().await,
            MainState::EnterLearnMode => {
                info!("learn mode");
                self.device.buzzer.play(Signal::ModeFast, true);
                self.device.rtc.start(self.device.config.timeouts.learn_mode);
                self.go(MainState::WaitLearnMode)
            }
            MainState::WaitLearnMode => self.wait_learn_mode().await,
            MainState::EnterSoftwareKey => {
                self.device.play(Signal::Positive).await;
                self.engine.trigger(&mut self.device, Trigger::Key).await;
                self.go(MainState::PrepareWakeUp)
            }
            MainState::EnterSoftwareRtc => {
                self.engine.trigger(&mut self.device, Trigger::Rtc).await;
                self.engine.gym_rtc(&mut self.device).await;
                self.go(MainState::PrepareWakeUp)
            }
            MainState::EnterSoftwareDoor => {
                if self.device.cards.key_count() == 0 {
                    let signal = if self.device.is_door_closed().await {
                        Signal::TestOn
                    } else {
                        Signal::TestOff
                    };
                    self.device.play(signal).await;
                }
                self.engine.trigger(&mut self.device, Trigger::Door).await;
                self.go(MainState::PrepareWakeUp)
            }
            MainState::FoundUnknownCard => {
                info!("unknown card");
                self.device.play(Signal::Negative).await;
                self.go(MainState::PrepareWakeUp)
            }
            MainState::EnterProgrammingMode1 => {
                info!("programming mode 1");
                self.device.rtc.start(self.device.config.timeouts.prog_mode_1);
                self.device.buzzer.play(Signal::ModeFast, true);
                self.go(MainState::WaitProgMode1)
            }
            MainState::EnterProgrammingMode2 => {
                info!("programming mode 2");
                self.device.rtc.start(self.device.config.timeouts.delete_all);
                self.device.buzzer.play(Signal::ModeSlow, true);
                self.go(MainState::WaitProgMode2)
            }
            MainState::WaitProgMode1 => self.wait_prog_mode_1().await,
            MainState::WaitProgMode2 => self.wait_prog_mode_2().await,
            MainState::ErrorMultipleCards | MainState::ExitProgOrLearnMode => {
                if self.states.current() == MainState::ErrorMultipleCards {
                    info!("multiple cards in field");
                }
                self.device.buzzer.stop();
                self.device.rtc.stop();
                self.engine.restart_alarm(&mut self.device);
                self.go(MainState::PrepareWakeUp)
            }
            MainState::ErrorSetProgCardFailed => {
                self.device.play(Signal::Error).await;
                self.device.rtc.stop();
                self.engine.restart_alarm(&mut self.device);
                self.go(MainState::PrepareWakeUp)
            }
        }
    }

    async fn deep_sleep(&mut self) -> Result<Step> {
        self.device.rfid.pause();
        self.engine.check_alarm(&mut self.device).await;

        if self.bad_detection_counter >= self.device.config.bad_detection_threshold {
            debug!(
                counter = self.bad_detection_counter,
                "empty wake-ups, taking a nap"
            );
            self.device
                .rtc
                .start_with_interrupt(self.device.config.bad_detection_nap_secs);
            self.device.wait_for_rtc_interrupt().await;
            if self.device.cards.key_count() == 0 {
                self.device.play(Signal::WakeUp).await;
                sleep(WAKE_CHIRP_DELAY).await;
            }
        }

        self.device.door.settle().await;

        if !self.device.irq.any() {
            match self.deadline {
                Some(deadline) => {
                    if timeout_at(deadline, self.device.irq.wait()).await.is_err() {
                        debug!("run deadline reached in deep sleep");
                        return Ok(Step::Halted);
                    }
                }
                None => self.device.irq.wait().await,
            }
            self.wake_counter = self.wake_counter.saturating_add(1);
            if let Err(e) = self.device.rfid.reinitialize() {
                error!(error = %e, "RFID re-initialization failed");
            }
            info!(wake_counter = self.wake_counter, "woke up");
        }

        let wake_capture =
            self.device.rfid.disarm_wake_detector() | self.device.irq.take(Irq::Rfid);

        let next = if self.device.irq.peek(Irq::Learn) {
            // learn mode scans on its own; a card that moved the field before
            // the press is not a learn candidate
            self.device.irq.set_enabled(Irq::Learn, false);
            MainState::EnterLearnMode
        } else if self.device.irq.take(Irq::Door) {
            self.device.irq.set_enabled(Irq::Learn, false);
            MainState::EnterSoftwareDoor
        } else if self.device.rtc.poll_interrupt() {
            MainState::EnterSoftwareRtc
        } else if wake_capture {
            MainState::WokenUp
        } else {
            MainState::PrepareWakeUp
        };
        self.go(next)
    }

    async fn woken_up(&mut self) -> Result<Step> {
        sleep(WAKE_SCAN_DELAY).await;
        let scan = self.device.scan().await;

        match scan.found {
            0 => {
                if self.device.irq.peek(Irq::Learn) {
                    self.device.irq.set_enabled(Irq::Learn, false);
                    self.device.rfid.disarm_wake_detector();
                    return self.go(MainState::EnterLearnMode);
                }
                if self.bad_detection_counter <= self.device.config.bad_detection_threshold {
                    self.bad_detection_counter = self.bad_detection_counter.saturating_add(1);
                }
                debug!(counter = self.bad_detection_counter, "woke up without a card");
                self.go(MainState::PrepareWakeUp)
            }
            1 => {
                self.bad_detection_counter = 0;
                self.device.irq.set_enabled(Irq::Learn, false);
                let Some((uid, card_type)) = scan.single() else {
                    return self.go(MainState::PrepareWakeUp);
                };
                debug!(%uid, %card_type, "card found");

                let function = self.device.software_function();
                if function.contains(SwFunction::GYM) && !card_type.is_software() {
                    self.device.door.arm_both();
                    self.engine
                        .gym_card(&mut self.device, uid, card_type)
                        .await;
                    return self.go(MainState::PrepareWakeUp);
                }

                match card_type {
                    CardType::Key { .. } => self.go(MainState::EnterSoftwareKey),
                    CardType::Programming => self.go(MainState::EnterProgrammingMode1),
                    CardType::Software(function) => {
                        self.set_software(function).await?;
                        self.go(MainState::ExitProgOrLearnMode)
                    }
                    CardType::GymSoftware(GymVariant::NoDelay) => {
                        self.set_software(SwFunction::NONE).await?;
                        self.go(MainState::ExitProgOrLearnMode)
                    }
                    CardType::GymSoftware(_) => self.go(MainState::PrepareWakeUp),
                    CardType::Unknown => self.go(MainState::FoundUnknownCard),
                }
            }
            _ => {
                self.device.irq.set_enabled(Irq::Learn, false);
                self.go(MainState::ErrorMultipleCards)
            }
        }
    }

    /// Swap the active software function.
    async fn set_software(&mut self, function: SwFunction) -> Result<()> {
        self.device.play(Signal::SetSoftware).await;
        self.engine.trigger(&mut self.device, Trigger::Deinit).await;
        self.device.cards.set_software_function(function)?;
        info!(%function, "software function changed");
        self.engine.trigger(&mut self.device, Trigger::Init).await;
        Ok(())
    }

    async fn delete_all_keys(&mut self) -> Result<()> {
        self.device.cards.delete_all_keys()?;
        self.device.play(Signal::AllDeleted).await;
        sleep(ALL_DELETED_DELAY).await;
        self.engine
            .trigger(&mut self.device, Trigger::KeyCountChanged)
            .await;
        Ok(())
    }

    /// Persist a gym configuration and request the reset that applies it.
    async fn provision_gym(&mut self, hours: u8) -> Result<Step> {
        self.device
            .cards
            .set_software_function_and_open_delay(SwFunction::GYM, hours)?;
        info!(hours, "gym mode provisioned, resetting");
        self.device.play(Signal::AllDeleted).await;
        Ok(Step::Reset)
    }

    async fn wait_learn_mode(&mut self) -> Result<Step> {
        let mut next = MainState::WaitLearnMode;
        if self.device.rtc.is_finished() {
            self.device.buzzer.stop();
            sleep(LEARN_EXIT_DELAY).await;
            next = MainState::ExitProgOrLearnMode;
        }

        let Some((uid, card_type)) = self.device.scan().await.single() else {
            return self.go(next);
        };

        match card_type {
            CardType::GymSoftware(GymVariant::NoDelay) => {
                let hold = self.device.config.timeouts.gym_delete_all_hold;
                if self.card_held(&uid, hold).await {
                    self.device.buzzer.stop();
                    self.device.rtc.stop();
                    info!("gym card held, deleting all keys");
                    self.delete_all_keys().await?;
                }
                self.provision_gym(0).await
            }
            CardType::GymSoftware(variant) => {
                self.device.buzzer.stop();
                self.device.rtc.stop();
                self.provision_gym(variant.open_delay_hours()).await
            }
            _ => {
                self.device.buzzer.stop();
                self.device.rtc.stop();
                match self.device.cards.set_programming_card(&uid) {
                    Ok(()) => {
                        info!(%uid, "programming card set");
                        sleep(LEARN_EXIT_DELAY).await;
                        self.device.play(Signal::Positive).await;
                        self.go(MainState::ExitProgOrLearnMode)
                    }
                    Err(e) => {
                        warn!(%uid, error = %e, "programming card not set");
                        sleep(LEARN_EXIT_DELAY).await;
                        self.go(MainState::ErrorSetProgCardFailed)
                    }
                }
            }
        }
    }

    /// Keep scanning while `uid` stays alone in the field. True once
    /// `seconds` have passed since the current RTC window started.
    async fn card_held(&mut self, uid: &CardUid, seconds: u8) -> bool {
        loop {
            if self.device.rtc.seconds_passed(seconds) {
                return true;
            }
            match self.device.scan().await.single() {
                Some((held, _)) if held == *uid => sleep(HOLD_POLL_INTERVAL).await,
                _ => return false,
            }
        }
    }

    async fn wait_prog_mode_1(&mut self) -> Result<Step> {
        let scan = self.device.scan().await;
        match scan.found {
            0 => {
                if self.device.rtc.is_finished() {
                    self.device.buzzer.stop();
                    self.device.rtc.stop();
                    return self.go(MainState::ExitProgOrLearnMode);
                }
                Ok(Step::Continue)
            }
            1 => {
                let Some((uid, card_type)) = scan.single() else {
                    return Ok(Step::Continue);
                };
                self.program_card(uid, card_type).await
            }
            _ => {
                self.device.buzzer.stop();
                self.device.rtc.stop();
                self.go(MainState::ErrorMultipleCards)
            }
        }
    }

    async fn program_card(&mut self, uid: CardUid, card_type: CardType) -> Result<Step> {
        let escalate = self
            .device
            .rtc
            .seconds_passed(self.device.config.timeouts.switch_to_prog2);

        match card_type {
            CardType::Programming => {
                if escalate {
                    self.device.rtc.stop();
                    return self.go(MainState::EnterProgrammingMode2);
                }
                Ok(Step::Continue)
            }
            CardType::Key { .. } => {
                if let Err(e) = self.device.cards.delete_key(&uid) {
                    warn!(%uid, error = %e, "key not deleted");
                }
                self.device.play(Signal::Negative).await;
                self.engine
                    .trigger(&mut self.device, Trigger::KeyCountChanged)
                    .await;
                self.go(MainState::ExitProgOrLearnMode)
            }
            CardType::Unknown => {
                let signal = match self.device.cards.add_key(&uid) {
                    Ok(()) => Signal::Positive,
                    Err(e) => {
                        warn!(%uid, error = %e, "key not added");
                        Signal::Error
                    }
                };
                self.device.play(signal).await;
                self.engine
                    .trigger(&mut self.device, Trigger::KeyCountChanged)
                    .await;
                self.go(MainState::ExitProgOrLearnMode)
            }
            CardType::Software(function) => {
                self.set_software(function).await?;
                self.go(MainState::ExitProgOrLearnMode)
            }
            CardType::GymSoftware(_) => {
                debug!(%uid, %card_type, "card ignored in programming mode");
                self.go(MainState::ExitProgOrLearnMode)
            }
        }
    }

    async fn wait_prog_mode_2(&mut self) -> Result<Step> {
        match self.device.scan().await.single() {
            Some((_, CardType::Programming)) => {
                if self.device.rtc.is_finished() {
                    self.device.buzzer.stop();
                    info!("programming card held, deleting all keys");
                    self.delete_all_keys().await?;
                    return self.go(MainState::ExitProgOrLearnMode);
                }
                Ok(Step::Continue)
            }
            Some(_) => self.go(MainState::EnterProgrammingMode1),
            None => {
                self.device.buzzer.stop();
                self.device.rtc.stop();
                self.go(MainState::EnterProgrammingMode1)
            }
        }
    }
}
