//! Main loop states and the transition history.
//!
//! The lock runs one cooperative loop. Each pass executes the body of the
//! current [`MainState`] and names the next one; [`StateTracker`] validates
//! that step against the transition table and keeps a bounded history for
//! diagnostics.
//!
//! # Examples
//!
//! ```
//! use doorlock_firmware::{MainState, StateTracker};
//!
//! let mut states = StateTracker::new();
//! assert_eq!(states.current(), MainState::Initialize);
//!
//! states.transition_to(MainState::PrepareWakeUp).unwrap();
//! states.transition_to(MainState::DeepSleep).unwrap();
//! assert!(states.transition_to(MainState::WaitProgMode2).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use doorlock_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Maximum number of transitions kept in history.
///
/// One card presentation takes three to six transitions, so this covers
/// the last couple of dozen interactions.
pub const MAX_HISTORY_SIZE: usize = 100;

/// States of the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainState {
    /// Power-up, runs once
    Initialize,
    /// Re-arm every wake source before sleeping
    PrepareWakeUp,
    DeepSleep,
    EnterLearnMode,
    WaitLearnMode,
    /// Something disturbed the antenna field
    WokenUp,
    EnterSoftwareKey,
    EnterSoftwareRtc,
    EnterSoftwareDoor,
    EnterProgrammingMode1,
    EnterProgrammingMode2,
    WaitProgMode1,
    WaitProgMode2,
    FoundUnknownCard,
    ErrorMultipleCards,
    ErrorSetProgCardFailed,
    ExitProgOrLearnMode,
}

impl fmt::Display for MainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl MainState {
    /// Check if the loop may move from this state to `target`.
    ///
    /// Staying in a state is not a transition and is not covered here.
    ///
    /// ```
    /// use doorlock_firmware::MainState;
    ///
    /// assert!(MainState::WokenUp.can_transition_to(&MainState::EnterSoftwareKey));
    /// assert!(!MainState::DeepSleep.can_transition_to(&MainState::EnterSoftwareKey));
    /// ```
    pub fn can_transition_to(&self, target: &MainState) -> bool {
        use MainState::*;
        matches!(
            (self, target),
            (Initialize, PrepareWakeUp)
                | (PrepareWakeUp, DeepSleep)
                | (
                    DeepSleep,
                    EnterLearnMode | EnterSoftwareDoor | EnterSoftwareRtc | WokenUp | PrepareWakeUp
                )
                | (EnterLearnMode, WaitLearnMode)
                | (WaitLearnMode, ExitProgOrLearnMode | ErrorSetProgCardFailed)
                | (
                    WokenUp,
                    PrepareWakeUp
                        | EnterLearnMode
                        | EnterSoftwareKey
                        | EnterProgrammingMode1
                        | ExitProgOrLearnMode
                        | FoundUnknownCard
                        | ErrorMultipleCards
                )
                | (
                    EnterSoftwareKey | EnterSoftwareRtc | EnterSoftwareDoor | FoundUnknownCard,
                    PrepareWakeUp
                )
                | (EnterProgrammingMode1, WaitProgMode1)
                | (
                    WaitProgMode1,
                    EnterProgrammingMode2 | ExitProgOrLearnMode | ErrorMultipleCards
                )
                | (EnterProgrammingMode2, WaitProgMode2)
                | (WaitProgMode2, ExitProgOrLearnMode | EnterProgrammingMode1)
                | (
                    ErrorMultipleCards | ErrorSetProgCardFailed | ExitProgOrLearnMode,
                    PrepareWakeUp
                )
        )
    }

    /// True for the states that wait on a card with an RTC window running.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            MainState::WaitLearnMode | MainState::WaitProgMode1 | MainState::WaitProgMode2
        )
    }
}

/// A single recorded transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub from: MainState,
    pub to: MainState,
    #[serde(skip)]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: MainState, to: MainState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Current main loop state plus recent history.
#[derive(Debug)]
pub struct StateTracker {
    current: MainState,
    entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Tracker at [`MainState::Initialize`].
    pub fn new() -> Self {
        Self {
            current: MainState::Initialize,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current(&self) -> MainState {
        self.current
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the table has no edge
    /// from the current state to `next`; the state is left unchanged.
    pub fn transition_to(&mut self, next: MainState) -> Result<StateTransition> {
        if !self.current.can_transition_to(&next) {
            return Err(Error::InvalidStateTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }

        let transition = StateTransition::new(self.current, next);
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());
        self.current = next;
        self.entered_at = transition.timestamp;
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MainState::*;
    use rstest::rstest;

    const ALL: [MainState; 17] = [
        Initialize,
        PrepareWakeUp,
        DeepSleep,
        EnterLearnMode,
        WaitLearnMode,
        WokenUp,
        EnterSoftwareKey,
        EnterSoftwareRtc,
        EnterSoftwareDoor,
        EnterProgrammingMode1,
        EnterProgrammingMode2,
        WaitProgMode1,
        WaitProgMode2,
        FoundUnknownCard,
        ErrorMultipleCards,
        ErrorSetProgCardFailed,
        ExitProgOrLearnMode,
    ];

    #[test]
    fn test_new_tracker_starts_initialize() {
        let states = StateTracker::new();
        assert_eq!(states.current(), Initialize);
        assert!(states.history().is_empty());
    }

    #[rstest]
    #[case(Initialize, PrepareWakeUp)]
    #[case(DeepSleep, EnterLearnMode)]
    #[case(DeepSleep, EnterSoftwareRtc)]
    #[case(WokenUp, FoundUnknownCard)]
    #[case(WokenUp, ExitProgOrLearnMode)]
    #[case(WaitProgMode1, EnterProgrammingMode2)]
    #[case(WaitProgMode2, EnterProgrammingMode1)]
    #[case(ErrorSetProgCardFailed, PrepareWakeUp)]
    fn test_valid_transitions(#[case] from: MainState, #[case] to: MainState) {
        assert!(from.can_transition_to(&to));
    }

    #[rstest]
    #[case(Initialize, DeepSleep)]
    #[case(DeepSleep, EnterSoftwareKey)]
    #[case(WaitLearnMode, EnterProgrammingMode1)]
    #[case(WaitProgMode2, ErrorMultipleCards)]
    #[case(PrepareWakeUp, PrepareWakeUp)]
    fn test_invalid_transitions(#[case] from: MainState, #[case] to: MainState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_every_state_can_reach_sleep() {
        // every state other than sleep itself has a path back to PrepareWakeUp
        for state in ALL {
            let mut frontier = vec![state];
            let mut seen = vec![state];
            let mut found = state == PrepareWakeUp;
            while let Some(s) = frontier.pop() {
                for next in ALL {
                    if s.can_transition_to(&next) && !seen.contains(&next) {
                        found |= next == PrepareWakeUp;
                        seen.push(next);
                        frontier.push(next);
                    }
                }
            }
            assert!(found, "{} cannot reach PrepareWakeUp", state);
        }
    }

    #[test]
    fn test_nothing_returns_to_initialize() {
        for state in ALL {
            assert!(!state.can_transition_to(&Initialize));
        }
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut states = StateTracker::new();
        let error = states.transition_to(WokenUp).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid state transition from Initialize to WokenUp"
        );
        assert_eq!(states.current(), Initialize);
        assert!(states.history().is_empty());
    }

    #[test]
    fn test_history_is_recorded() {
        let mut states = StateTracker::new();
        states.transition_to(PrepareWakeUp).unwrap();
        states.transition_to(DeepSleep).unwrap();
        states.transition_to(WokenUp).unwrap();

        let last = states.last_transitions(2);
        assert_eq!(last.len(), 2);
        assert_eq!((last[0].from, last[0].to), (PrepareWakeUp, DeepSleep));
        assert_eq!((last[1].from, last[1].to), (DeepSleep, WokenUp));
    }

    #[test]
    fn test_history_size_limit() {
        let mut states = StateTracker::new();
        states.transition_to(PrepareWakeUp).unwrap();
        for _ in 0..MAX_HISTORY_SIZE {
            states.transition_to(DeepSleep).unwrap();
            states.transition_to(PrepareWakeUp).unwrap();
        }
        assert_eq!(states.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(states.history().front().map(|t| t.from), Some(PrepareWakeUp));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_in_current_state() {
        let mut states = StateTracker::new();
        states.transition_to(PrepareWakeUp).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(states.time_in_current_state(), Duration::from_secs(2));
    }

    #[test]
    fn test_serialize_snake_case() {
        let json = serde_json::to_string(&ExitProgOrLearnMode).unwrap();
        assert_eq!(json, "\"exit_prog_or_learn_mode\"");
    }

    #[test]
    fn test_interactive_states() {
        let interactive: Vec<_> = ALL.into_iter().filter(MainState::is_interactive).collect();
        assert_eq!(interactive, vec![WaitLearnMode, WaitProgMode1, WaitProgMode2]);
    }
}
