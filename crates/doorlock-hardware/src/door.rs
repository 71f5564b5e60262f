//! Door sensor interrupt model.
//!
//! The door has two contacts, one per direction. Only one edge is armed at a
//! time: after an edge fires, both are masked, the state is updated, and the
//! opposite edge is armed once the pull-up guard delay has elapsed. Edges
//! arriving inside the guard window are lost.

use crate::irq::{Irq, IrqFlags};
use crate::traits::DoorSensor;
use doorlock_core::DoorState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Contact edge reported by the door sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorEdge {
    Opened,
    Closed,
}

impl DoorEdge {
    fn state(self) -> DoorState {
        match self {
            DoorEdge::Opened => DoorState::Open,
            DoorEdge::Closed => DoorState::Closed,
        }
    }

    fn opposite(self) -> DoorEdge {
        match self {
            DoorEdge::Opened => DoorEdge::Closed,
            DoorEdge::Closed => DoorEdge::Opened,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Armed {
    opened: bool,
    closed: bool,
}

impl Armed {
    fn contains(self, edge: DoorEdge) -> bool {
        match edge {
            DoorEdge::Opened => self.opened,
            DoorEdge::Closed => self.closed,
        }
    }

    fn only(edge: DoorEdge) -> Self {
        Self {
            opened: edge == DoorEdge::Opened,
            closed: edge == DoorEdge::Closed,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: DoorState,
    armed: Armed,
    rearm: Option<(DoorEdge, Instant)>,
}

impl Inner {
    fn apply_rearm(&mut self, now: Instant) {
        if let Some((edge, at)) = self.rearm
            && now >= at
        {
            self.armed = Armed::only(edge);
            self.rearm = None;
        }
    }
}

/// Interrupt-side view of the door.
#[derive(Debug)]
pub struct DoorMonitor {
    irq: Arc<IrqFlags>,
    guard: Duration,
    inner: Mutex<Inner>,
}

impl DoorMonitor {
    pub fn new(irq: Arc<IrqFlags>, guard: Duration) -> Self {
        Self {
            irq,
            guard,
            inner: Mutex::new(Inner {
                state: DoorState::Unknown,
                armed: Armed::default(),
                rearm: None,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Boot configuration: assume open and wait for the close contact.
    pub fn initialize(&self) {
        let mut inner = self.inner();
        inner.state = DoorState::Open;
        inner.armed = Armed::default();
        inner.rearm = Some((DoorEdge::Closed, Instant::now() + self.guard));
        debug!("door monitor initialized, waiting for close edge");
    }

    /// Contact edge from the sensor.
    pub fn on_edge(&self, edge: DoorEdge) {
        let now = Instant::now();
        {
            let mut inner = self.inner();
            inner.apply_rearm(now);
            if !inner.armed.contains(edge) {
                trace!(?edge, "door edge ignored");
                return;
            }
            inner.state = edge.state();
            inner.armed = Armed::default();
            inner.rearm = Some((edge.opposite(), now + self.guard));
        }
        self.irq.raise(Irq::Door);
    }

    /// Arm both contacts immediately.
    pub fn arm_both(&self) {
        let mut inner = self.inner();
        inner.armed = Armed {
            opened: true,
            closed: true,
        };
        inner.rearm = None;
    }

    /// Wait for a pending re-arm to complete.
    pub async fn settle(&self) {
        let at = self.inner().rearm.map(|(_, at)| at);
        if let Some(at) = at {
            tokio::time::sleep_until(at).await;
            self.inner().apply_rearm(Instant::now());
        }
        trace!(state = %self.door_state(), "door settled");
    }
}

impl DoorSensor for DoorMonitor {
    fn door_state(&self) -> DoorState {
        self.inner().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> (DoorMonitor, Arc<IrqFlags>) {
        let irq = Arc::new(IrqFlags::new());
        (DoorMonitor::new(irq.clone(), Duration::from_millis(10)), irq)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_open() {
        let (door, _) = monitor();
        assert_eq!(door.door_state(), DoorState::Unknown);
        door.initialize();
        assert_eq!(door.door_state(), DoorState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_swaps_and_rearms_after_guard() {
        let (door, irq) = monitor();
        door.initialize();
        door.settle().await;

        door.on_edge(DoorEdge::Closed);
        assert_eq!(door.door_state(), DoorState::Closed);
        assert!(irq.take(Irq::Door));

        // inside the guard window the open edge is not armed yet
        door.on_edge(DoorEdge::Opened);
        assert_eq!(door.door_state(), DoorState::Closed);
        assert!(!irq.peek(Irq::Door));

        tokio::time::sleep(Duration::from_millis(10)).await;
        door.on_edge(DoorEdge::Opened);
        assert_eq!(door.door_state(), DoorState::Open);
        assert!(irq.take(Irq::Door));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_edge_ignored() {
        let (door, irq) = monitor();
        door.initialize();
        door.settle().await;

        door.on_edge(DoorEdge::Opened);
        assert_eq!(door.door_state(), DoorState::Open);
        assert!(!irq.any());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_both_accepts_either_edge() {
        let (door, irq) = monitor();
        door.initialize();
        door.arm_both();
        door.on_edge(DoorEdge::Closed);
        assert_eq!(door.door_state(), DoorState::Closed);
        assert!(irq.take(Irq::Door));
    }
}
