//! Scripted stimulus for a simulated lock.
//!
//! A scenario is a JSON document with a run length, an optional firmware
//! configuration and a list of timed events:
//!
//! ```json
//! {
//!   "duration_ms": 20000,
//!   "events": [
//!     { "at_ms": 4000, "action": "press_learn" },
//!     { "at_ms": 4500, "action": "present", "card": "04:a0:5f:12" },
//!     { "at_ms": 5500, "action": "remove", "card": "04:a0:5f:12" }
//!   ]
//! }
//! ```
//!
//! Event times count from power-up, so the first couple of seconds are
//! spent booting.

use anyhow::{Context, Result, ensure};
use doorlock_cardman::DatabaseLayout;
use doorlock_core::{CardUid, FirmwareConfig};
use doorlock_hardware::BoardHandle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Run length used when the scenario does not name one.
pub const DEFAULT_DURATION_MS: u64 = 60_000;

/// Something done to the lock from the outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Bring a card into the reader field
    Present { card: CardUid },
    Remove { card: CardUid },
    /// Take every card out of the field
    ClearField,
    PressLearn,
    OpenDoor,
    CloseDoor,
    /// Sag or restore the supply
    Brownout { active: bool },
    ReplaceBattery,
    /// Block or free the bolt
    Jam { active: bool },
}

impl Action {
    /// Apply this action to the board.
    pub fn apply(&self, board: &BoardHandle) {
        debug!(action = ?self, "scenario event");
        match self {
            Action::Present { card } => board.rfid.present(*card),
            Action::Remove { card } => board.rfid.remove(card),
            Action::ClearField => board.rfid.clear(),
            Action::PressLearn => board.press_learn(),
            Action::OpenDoor => board.door.open(),
            Action::CloseDoor => board.door.close(),
            Action::Brownout { active } => board.motor.set_brownout(*active),
            Action::ReplaceBattery => board.motor.replace_battery(),
            Action::Jam { active } => board.motor.jam(*active),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_duration")]
    pub duration_ms: u64,

    /// Firmware configuration; factory defaults when absent
    #[serde(default)]
    pub config: Option<FirmwareConfig>,

    #[serde(default)]
    pub layout: DatabaseLayout,

    #[serde(default)]
    pub events: Vec<Event>,
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_MS
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_DURATION_MS,
            config: None,
            layout: DatabaseLayout::default(),
            events: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut scenario: Scenario =
            serde_json::from_str(json).context("malformed scenario")?;
        scenario.normalize()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read scenario {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }

    /// Sort events by time and reject a zero-length run. Events at the same
    /// instant keep their order in the file.
    fn normalize(&mut self) -> Result<()> {
        ensure!(self.duration_ms > 0, "scenario duration must be non-zero");
        self.events.sort_by_key(|event| event.at_ms);
        for event in self.events.iter().filter(|e| e.at_ms > self.duration_ms) {
            warn!(
                at_ms = event.at_ms,
                duration_ms = self.duration_ms,
                "event scheduled after the end of the run"
            );
        }
        Ok(())
    }
}

/// Load a standalone firmware configuration file.
pub fn load_config(path: &Path) -> Result<FirmwareConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("malformed config {}", path.display()))
}
