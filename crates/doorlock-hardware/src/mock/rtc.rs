//! RTC countdown on tokio time.

use crate::{
    irq::{Irq, IrqFlags},
    traits::RtcTimer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// [`RtcTimer`] backed by `tokio::time`.
///
/// Expiry is derived from the deadline, so `is_finished` is exact even if
/// the expiry task has not run yet. Windows started with interrupt spawn a
/// task that raises [`Irq::Rtc`] at the deadline.
#[derive(Debug)]
pub struct TokioRtc {
    irq: Arc<IrqFlags>,
    started: Instant,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl TokioRtc {
    pub fn new(irq: Arc<IrqFlags>) -> Self {
        Self {
            irq,
            started: Instant::now(),
            deadline: None,
            task: None,
        }
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn begin(&mut self, seconds: u8, interrupt: bool) {
        self.cancel();
        // restarting discards an expiry that was not collected yet
        self.irq.take(Irq::Rtc);

        if seconds == 0 {
            self.stop();
            return;
        }

        let now = Instant::now();
        let deadline = now + Duration::from_secs(seconds as u64);
        self.started = now;
        self.deadline = Some(deadline);
        debug!(seconds, interrupt, "RTC start");

        if interrupt {
            let irq = self.irq.clone();
            self.task = Some(tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                irq.raise(Irq::Rtc);
            }));
        }
    }
}

impl Drop for TokioRtc {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl RtcTimer for TokioRtc {
    fn start(&mut self, seconds: u8) {
        self.begin(seconds, false);
    }

    fn start_with_interrupt(&mut self, seconds: u8) {
        self.begin(seconds, true);
    }

    fn stop(&mut self) {
        self.cancel();
        if self.deadline.take().is_some() {
            trace!("RTC stop");
        }
    }

    fn is_finished(&self) -> bool {
        self.deadline.is_none_or(|deadline| Instant::now() >= deadline)
    }

    fn seconds_passed(&self, seconds: u8) -> bool {
        self.started.elapsed() >= Duration::from_secs(seconds as u64)
    }

    fn poll_interrupt(&mut self) -> bool {
        self.irq.take(Irq::Rtc)
    }

    fn interrupt_pending(&self) -> bool {
        self.irq.peek(Irq::Rtc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtc() -> (TokioRtc, Arc<IrqFlags>) {
        let irq = Arc::new(IrqFlags::new());
        (TokioRtc::new(irq.clone()), irq)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_is_finished() {
        let (rtc, _) = rtc();
        assert!(rtc.is_finished());
        assert!(rtc.seconds_passed(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_without_interrupt() {
        let (mut rtc, irq) = rtc();
        rtc.start(3);
        assert!(!rtc.is_finished());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rtc.seconds_passed(2));
        assert!(!rtc.seconds_passed(9));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rtc.is_finished());
        assert!(!irq.peek(Irq::Rtc));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_window_keeps_counting() {
        let (mut rtc, _) = rtc();
        rtc.start(3);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(rtc.is_finished());
        assert!(!rtc.seconds_passed(9));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rtc.seconds_passed(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_elapsed() {
        let (mut rtc, _) = rtc();
        rtc.start(3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        rtc.start(3);
        assert!(!rtc.seconds_passed(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_raised_on_expiry() {
        let (mut rtc, irq) = rtc();
        rtc.start_with_interrupt(20);

        irq.wait().await;
        assert!(rtc.interrupt_pending());
        assert!(rtc.poll_interrupt());
        assert!(!rtc.poll_interrupt());
        assert!(rtc.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_interrupt() {
        let (mut rtc, irq) = rtc();
        rtc.start_with_interrupt(1);
        rtc.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!irq.peek(Irq::Rtc));
        assert!(rtc.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_seconds_stops() {
        let (mut rtc, _) = rtc();
        rtc.start(5);
        rtc.start(0);
        assert!(rtc.is_finished());
    }
}
