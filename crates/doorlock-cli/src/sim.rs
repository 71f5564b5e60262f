//! Scenario runner on the mock board.
//!
//! The firmware runs on the caller's tokio runtime, which must use paused
//! time so a long scenario completes instantly. Scenario events are applied
//! by a background task; when the firmware requests a reset the board is
//! rebuilt on the same page store and booted again, keeping whatever is
//! physically true (cards in the field, bolt position, door position).

use crate::scenario::{Event, Scenario};
use anyhow::{Context, Result, bail};
use doorlock_core::FirmwareConfig;
use doorlock_firmware::{MainState, MainStateMachine, RunOutcome, boot};
use doorlock_hardware::{BoardHandle, MockBoard, Signal, mock::MemoryPageStore};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::info;

/// Reboots tolerated before the run is considered a boot loop.
pub const DEFAULT_MAX_REBOOTS: u32 = 8;

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub final_state: MainState,
    pub software_function: String,
    pub open_delay: u8,
    pub key_count: u8,
    pub soft_card_count: u8,
    pub programming_card: Option<String>,
    pub lock_open: bool,
    pub door_open: bool,
    pub reboots: u32,
    pub wake_ups: u32,
    /// Every signal the buzzer played, across reboots
    pub tones: Vec<Signal>,
}

impl Report {
    fn new(
        lock: &MainStateMachine<MockBoard>,
        board: &BoardHandle,
        tones: Vec<Signal>,
        reboots: u32,
    ) -> Self {
        let cards = &lock.device().cards;
        Self {
            final_state: lock.state(),
            software_function: cards.software_function().to_string(),
            open_delay: cards.open_delay(),
            key_count: cards.key_count(),
            soft_card_count: cards.soft_card_count(),
            programming_card: cards.programming_card().map(|uid| uid.to_hex()),
            lock_open: board.motor.is_open(),
            door_open: board.door.is_open(),
            reboots,
            wake_ups: lock.wake_counter(),
            tones,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "state:         {}", self.final_state)?;
        writeln!(f, "function:      {}", self.software_function)?;
        writeln!(f, "open delay:    {}h", self.open_delay)?;
        writeln!(f, "keys:          {}", self.key_count)?;
        writeln!(f, "soft cards:    {}", self.soft_card_count)?;
        writeln!(
            f,
            "programming:   {}",
            self.programming_card.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "lock:          {}", if self.lock_open { "open" } else { "closed" })?;
        writeln!(f, "door:          {}", if self.door_open { "open" } else { "closed" })?;
        writeln!(f, "reboots:       {}", self.reboots)?;
        writeln!(f, "tones:")?;
        for (i, tone) in self.tones.iter().enumerate() {
            writeln!(f, "  {:>3}  {}", i + 1, tone)?;
        }
        Ok(())
    }
}

/// Drives one scenario through the firmware.
#[derive(Debug, Clone)]
pub struct Simulator {
    scenario: Scenario,
    config: FirmwareConfig,
    max_reboots: u32,
}

impl Simulator {
    /// The scenario's own configuration is used unless `config` overrides it.
    pub fn new(mut scenario: Scenario, config: Option<FirmwareConfig>) -> Self {
        scenario.events.sort_by_key(|event| event.at_ms);
        let config = config
            .or_else(|| scenario.config.clone())
            .unwrap_or_default();
        Self {
            scenario,
            config,
            max_reboots: DEFAULT_MAX_REBOOTS,
        }
    }

    pub fn max_reboots(mut self, max_reboots: u32) -> Self {
        self.max_reboots = max_reboots;
        self
    }

    pub fn config(&self) -> &FirmwareConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<Report> {
        self.config
            .validate()
            .context("invalid firmware configuration")?;

        let layout = self.scenario.layout;
        let store = MemoryPageStore::new(layout.page_size, layout.page_count);
        let start = Instant::now();
        let end = start + Duration::from_millis(self.scenario.duration_ms);

        let (peripherals, mut board) =
            MockBoard::build(store.clone(), self.config.door_guard_delay());
        let (board_tx, board_rx) = watch::channel(board.clone());
        let driver = tokio::spawn(drive(self.scenario.events.clone(), start, board_rx));

        let mut lock = boot(peripherals, layout, self.config.clone())
            .await
            .context("boot failed")?;
        let mut tones = Vec::new();
        let mut reboots = 0;

        loop {
            match lock.run_until(end).await.context("main loop failed")? {
                RunOutcome::DeadlineReached => break,
                RunOutcome::ResetRequested => {
                    reboots += 1;
                    if reboots > self.max_reboots {
                        driver.abort();
                        bail!("lock reset {} times, giving up", reboots);
                    }
                    info!(reboots, "firmware requested reset, rebooting");

                    tones.extend(board.buzzer.played());
                    let (peripherals, next) =
                        MockBoard::build(store.clone(), self.config.door_guard_delay());
                    carry_over(&board, &next);
                    board_tx.send_replace(next.clone());
                    let door_closed = !board.door.is_open();
                    board = next;

                    lock = boot(peripherals, layout, self.config.clone())
                        .await
                        .context("reboot failed")?;
                    if door_closed {
                        lock.device().door.settle().await;
                        board.door.close();
                    }
                }
            }
        }

        driver.abort();
        tones.extend(board.buzzer.played());
        Ok(Report::new(&lock, &board, tones, reboots))
    }
}

/// Copy the physical state of `from` onto a freshly built board. The door is
/// closed after boot, once its monitor accepts the edge.
fn carry_over(from: &BoardHandle, to: &BoardHandle) {
    for uid in from.rfid.field() {
        to.rfid.present(uid);
    }
    to.motor.set_open(from.motor.is_open());
}

async fn drive(events: Vec<Event>, start: Instant, board: watch::Receiver<BoardHandle>) {
    for event in events {
        sleep_until(start + Duration::from_millis(event.at_ms)).await;
        let handle = board.borrow().clone();
        event.action.apply(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Action;
    use doorlock_core::{CardUid, constants::FACTORY_CARDS};

    const PROGRAMMING: CardUid = CardUid::from_array([0x04, 0xa0, 0x5f, 0x12]);

    fn at(at_ms: u64, action: Action) -> Event {
        Event { at_ms, action }
    }

    fn tap(events: &mut Vec<Event>, card: CardUid, at_ms: u64, hold_ms: u64) {
        events.push(at(at_ms, Action::Present { card }));
        events.push(at(at_ms + hold_ms, Action::Remove { card }));
    }

    fn scenario(duration_ms: u64, events: Vec<Event>) -> Scenario {
        Scenario {
            duration_ms,
            events,
            ..Scenario::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_run() {
        let report = Simulator::new(scenario(10_000, vec![]), None)
            .run()
            .await
            .unwrap();

        assert_eq!(report.final_state, MainState::DeepSleep);
        assert_eq!(report.tones, vec![Signal::Hello]);
        assert_eq!(report.key_count, 0);
        assert_eq!(report.reboots, 0);
        assert!(report.lock_open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_learn_programming_card() {
        let mut events = vec![at(4_000, Action::PressLearn)];
        tap(&mut events, PROGRAMMING, 4_500, 1_000);

        let report = Simulator::new(scenario(20_000, events), None)
            .run()
            .await
            .unwrap();

        assert_eq!(
            report.tones,
            vec![Signal::Hello, Signal::ModeFast, Signal::Positive]
        );
        assert_eq!(report.programming_card, Some(PROGRAMMING.to_hex()));
        assert_eq!(report.final_state, MainState::DeepSleep);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gym_card_reboots_into_gym_mode() {
        let (gym_12h, _) = FACTORY_CARDS[5];
        let mut events = vec![at(4_000, Action::PressLearn)];
        tap(&mut events, gym_12h, 4_500, 1_000);

        let report = Simulator::new(scenario(30_000, events), None)
            .run()
            .await
            .unwrap();

        assert_eq!(report.reboots, 1);
        assert!(report.software_function.contains("GYM"));
        assert_eq!(report.open_delay, 12);
        assert!(report.tones.contains(&Signal::AllDeleted));
        // one greeting per boot
        assert_eq!(report.tones.iter().filter(|t| **t == Signal::Hello).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reboot_limit() {
        let (gym_12h, _) = FACTORY_CARDS[5];
        let mut events = vec![at(4_000, Action::PressLearn)];
        tap(&mut events, gym_12h, 4_500, 1_000);

        let result = Simulator::new(scenario(30_000, events), None)
            .max_reboots(0)
            .run()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_is_rejected() {
        let config = FirmwareConfig::default().door_checks(0);
        let result = Simulator::new(Scenario::default(), Some(config)).run().await;
        assert!(result.is_err());
    }

    #[test]
    fn test_override_config_wins() {
        let mut scenario = Scenario::default();
        scenario.config = Some(FirmwareConfig::default().gym_tick_secs(5));

        let sim = Simulator::new(scenario.clone(), None);
        assert_eq!(sim.config().gym_tick_secs, 5);

        let sim = Simulator::new(scenario, Some(FirmwareConfig::default().gym_tick_secs(7)));
        assert_eq!(sim.config().gym_tick_secs, 7);
    }

    #[test]
    fn test_report_display() {
        let report = Report {
            final_state: MainState::DeepSleep,
            software_function: "ALARM (0x01)".into(),
            open_delay: 0,
            key_count: 2,
            soft_card_count: 0,
            programming_card: None,
            lock_open: false,
            door_open: true,
            reboots: 0,
            wake_ups: 3,
            tones: vec![Signal::Hello, Signal::Positive],
        };
        let text = report.to_string();
        assert!(text.contains("keys:          2"));
        assert!(text.contains("lock:          closed"));
        assert!(text.contains("    2  "));
    }
}
