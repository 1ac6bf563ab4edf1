//! Cancellable local timers owned by a session.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};

use crate::session::machine::TimerToken;

/// A pending timer. Dropping the handle cancels it.
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn spawn(token: TimerToken, after: Duration, fired: mpsc::UnboundedSender<TimerToken>) -> Self {
        let task = tokio::spawn(async move {
            sleep(after).await;
            let _ = fired.send(token);
        });
        Self { task }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Holds at most one armed timer; fired tokens arrive on the paired receiver.
pub struct TimerSlot {
    current: Option<TimerHandle>,
    fired: mpsc::UnboundedSender<TimerToken>,
}

impl TimerSlot {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerToken>) {
        let (fired, receiver) = mpsc::unbounded_channel();
        (
            Self {
                current: None,
                fired,
            },
            receiver,
        )
    }

    /// Replace the armed timer, cancelling the previous one.
    pub fn arm(&mut self, token: TimerToken, after: Duration) {
        self.current = Some(TimerHandle::spawn(token, after, self.fired.clone()));
    }

    pub fn disarm(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::machine::TimerKind;

    fn token(kind: TimerKind, generation: u64) -> TimerToken {
        TimerToken { kind, generation }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_delay() {
        let (mut slot, mut fired) = TimerSlot::new();
        slot.arm(token(TimerKind::Countdown, 1), Duration::from_secs(3));

        let early = tokio::time::timeout(Duration::from_millis(2_900), fired.recv()).await;
        assert!(early.is_err());
        assert_eq!(fired.recv().await, Some(token(TimerKind::Countdown, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_the_previous_timer() {
        let (mut slot, mut fired) = TimerSlot::new();
        slot.arm(token(TimerKind::Question, 1), Duration::from_secs(1));
        slot.arm(token(TimerKind::Question, 2), Duration::from_secs(5));

        assert_eq!(fired.recv().await, Some(token(TimerKind::Question, 2)));
        let nothing = tokio::time::timeout(Duration::from_secs(60), fired.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_and_drop_cancel() {
        let (mut slot, mut fired) = TimerSlot::new();
        slot.arm(token(TimerKind::Reveal, 1), Duration::from_secs(1));
        slot.disarm();
        let nothing = tokio::time::timeout(Duration::from_secs(5), fired.recv()).await;
        assert!(nothing.is_err());

        slot.arm(token(TimerKind::Reveal, 2), Duration::from_secs(1));
        drop(slot);

        // every sender is gone once the aborted tasks are reaped
        assert_eq!(fired.recv().await, None);
    }
}
