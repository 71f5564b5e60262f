//! Buzzer tone alphabet and signal vocabulary.
//!
//! A signal is a string over a small alphabet; each symbol selects a
//! [`ToneSetting`] that fixes its timer period and the number of square waves
//! played. Symbols outside the alphabet play as silence of zero length.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Buzzer timer clock in Hz.
pub const BUZZER_CLOCK_HZ: u64 = 2_000_000;

/// Duty cycle ramp applied while a tone plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fade {
    None,
    In,
    Out,
}

/// Preset for one symbol of the tone alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSetting {
    pub key: char,
    /// Timer period in clock ticks
    pub period: u16,
    /// Number of square waves
    pub repetitions: u16,
    pub fade: Fade,
}

impl ToneSetting {
    const fn new(key: char, period: u16, repetitions: u16, fade: Fade) -> Self {
        Self {
            key,
            period,
            repetitions,
            fade,
        }
    }

    /// Playback time of this tone.
    pub fn duration(&self) -> Duration {
        let ticks = self.period as u64 * self.repetitions as u64;
        Duration::from_micros(ticks * 1_000_000 / BUZZER_CLOCK_HZ)
    }
}

/// The tone alphabet.
pub const TONES: [ToneSetting; 9] = [
    ToneSetting::new('e', 290, 59, Fade::None),
    ToneSetting::new('a', 383, 248, Fade::None),
    ToneSetting::new('b', 1021, 60, Fade::None),
    ToneSetting::new('u', 383, 499, Fade::In),
    ToneSetting::new('i', 290, 379, Fade::In),
    ToneSetting::new('E', 290, 862, Fade::None),
    ToneSetting::new('V', 300, 3333, Fade::None),
    ToneSetting::new('.', 1021, 30, Fade::None),
    ToneSetting::new('-', 1021, 300, Fade::None),
];

/// Look up the preset for a symbol.
pub fn tone(key: char) -> Option<&'static ToneSetting> {
    TONES.iter().find(|t| t.key == key)
}

/// Every sound the lock can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    TestOn,
    TestOff,
    ModeFast,
    ModeSlow,
    Positive,
    Negative,
    AllDeleted,
    VccLow,
    RepeatedAlarm,
    FirstAlarm,
    SetSoftware,
    Error,
    WakeUp,
    Hello,
}

impl Signal {
    /// Symbol sequence played for this signal.
    pub fn sequence(self) -> &'static str {
        match self {
            Signal::TestOn => "i",
            Signal::TestOff => "u",
            Signal::ModeFast => "e-",
            Signal::ModeSlow => "eee---",
            Signal::Positive => "ui.",
            Signal::Negative => "abababab",
            Signal::AllDeleted => ".EEEEE",
            Signal::VccLow => "VVVVVVVVVVVVVVV",
            Signal::RepeatedAlarm => "EEEEE",
            Signal::FirstAlarm => "i--i--i--i--i--i--i----EEEE--",
            Signal::SetSoftware => "beeeebeeeeb",
            Signal::Error => "Eaaa-Eaaa-",
            Signal::WakeUp => "e.",
            Signal::Hello => "e-",
        }
    }

    /// Time one pass of the sequence takes.
    pub fn duration(self) -> Duration {
        self.sequence()
            .chars()
            .filter_map(tone)
            .map(ToneSetting::duration)
            .sum()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
