//! Debounced door reads.

use std::time::Duration;

use doorlock_core::DoorState;
use doorlock_hardware::DoorSensor;
use tracing::{trace, warn};

/// Sample the door `checks` times, waiting `interval` before each sample,
/// and report whether it is closed.
///
/// Ties count as closed. A sensor that never reports a definite state also
/// reads as closed, with a warning.
pub async fn is_door_closed(sensor: &impl DoorSensor, checks: u8, interval: Duration) -> bool {
    let mut open = 0u8;
    let mut closed = 0u8;

    for _ in 0..checks {
        tokio::time::sleep(interval).await;
        match sensor.door_state() {
            DoorState::Open => open += 1,
            DoorState::Closed => closed += 1,
            DoorState::Unknown => {}
        }
    }

    if open == 0 && closed == 0 {
        warn!(checks, "door state unknown");
    }
    trace!(open, closed, "door sampled");
    closed >= open
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Scripted {
        states: Vec<DoorState>,
        next: Cell<usize>,
    }

    impl Scripted {
        fn new(states: Vec<DoorState>) -> Self {
            Self {
                states,
                next: Cell::new(0),
            }
        }
    }

    impl DoorSensor for Scripted {
        fn door_state(&self) -> DoorState {
            let i = self.next.get();
            self.next.set(i + 1);
            self.states.get(i).copied().unwrap_or(DoorState::Unknown)
        }
    }

    const MS: Duration = Duration::from_millis(1);

    #[tokio::test(start_paused = true)]
    async fn test_tie_counts_as_closed() {
        let mut states = vec![DoorState::Open; 5];
        states.extend([DoorState::Closed; 5]);
        assert!(is_door_closed(&Scripted::new(states), 10, MS).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_majority_open() {
        let states = vec![
            DoorState::Open,
            DoorState::Closed,
            DoorState::Open,
            DoorState::Unknown,
        ];
        assert!(!is_door_closed(&Scripted::new(states), 4, MS).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_reads_closed() {
        assert!(is_door_closed(&Scripted::new(Vec::new()), 3, MS).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_sample_waits_first() {
        let start = tokio::time::Instant::now();
        let sensor = Scripted::new(vec![DoorState::Closed; 10]);
        is_door_closed(&sensor, 10, MS).await;
        assert_eq!(start.elapsed(), Duration::from_millis(10));
        assert_eq!(sensor.next.get(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sample_before_first_interval() {
        let sensor = Scripted::new(vec![DoorState::Open; 2]);
        let interval = Duration::from_millis(5);
        let early = tokio::time::timeout(
            Duration::from_millis(4),
            is_door_closed(&sensor, 2, interval),
        )
        .await;
        assert!(early.is_err());
        assert_eq!(sensor.next.get(), 0);
    }
}
