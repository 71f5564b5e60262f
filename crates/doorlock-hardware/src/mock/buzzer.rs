//! Mock buzzer that records what it plays.
//!
//! Playback takes the real sequence duration in tokio time, so code waiting
//! on the buzzer advances the (paused) clock the same way the device would.

use crate::{tone::Signal, traits::Buzzer};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct BuzzerState {
    played: Vec<Signal>,
    until: Option<Instant>,
    repeating: bool,
}

impl BuzzerState {
    fn is_running(&self) -> bool {
        self.repeating || self.until.is_some_and(|until| Instant::now() < until)
    }
}

/// Mock buzzer.
#[derive(Debug)]
pub struct MockBuzzer {
    state: Arc<Mutex<BuzzerState>>,
}

impl MockBuzzer {
    pub fn new() -> (Self, MockBuzzerHandle) {
        let state = Arc::new(Mutex::new(BuzzerState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockBuzzerHandle { state },
        )
    }

    fn state(&self) -> MutexGuard<'_, BuzzerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Buzzer for MockBuzzer {
    fn play(&mut self, signal: Signal, repeat: bool) {
        debug!(%signal, repeat, "buzzer start");
        let mut state = self.state();
        state.played.push(signal);
        state.until = Some(Instant::now() + signal.duration());
        state.repeating = repeat;
    }

    fn stop(&mut self) {
        let mut state = self.state();
        state.until = None;
        state.repeating = false;
    }

    async fn wait_until_finished(&mut self) {
        let until = {
            let state = self.state();
            if state.repeating {
                return;
            }
            state.until
        };
        if let Some(until) = until {
            tokio::time::sleep_until(until).await;
        }
    }

    fn is_running(&self) -> bool {
        self.state().is_running()
    }
}

/// Handle for inspecting a mock buzzer.
#[derive(Debug, Clone)]
pub struct MockBuzzerHandle {
    state: Arc<Mutex<BuzzerState>>,
}

impl MockBuzzerHandle {
    fn state(&self) -> MutexGuard<'_, BuzzerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every signal started so far, oldest first.
    pub fn played(&self) -> Vec<Signal> {
        self.state().played.clone()
    }

    pub fn last(&self) -> Option<Signal> {
        self.state().played.last().copied()
    }

    /// Forget the recorded signals.
    pub fn clear(&self) {
        self.state().played.clear();
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }
}
