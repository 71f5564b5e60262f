//! Physical door that feeds edges into a [`DoorMonitor`].

use crate::door::{DoorEdge, DoorMonitor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Handle for opening and closing the simulated door.
///
/// The door starts open. Moving it produces exactly one edge; whether the
/// monitor accepts it depends on which edge is armed.
#[derive(Debug, Clone)]
pub struct MockDoor {
    monitor: Arc<DoorMonitor>,
    open: Arc<AtomicBool>,
}

impl MockDoor {
    pub fn new(monitor: Arc<DoorMonitor>) -> Self {
        Self {
            monitor,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            debug!("door opened");
            self.monitor.on_edge(DoorEdge::Opened);
        }
    }

    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("door closed");
            self.monitor.on_edge(DoorEdge::Closed);
        }
    }

    /// Physical position, independent of what the monitor believes.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
