use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::machine::TimerEpoch;

/// One second elapsed on the countdown armed under `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub epoch: TimerEpoch,
}

/// Cancellable handle for a section countdown.
///
/// Exactly one of these is alive while the machine sits in a section. The
/// task emits one event per second tagged with the epoch it was armed under;
/// the machine discards anything stale, so even a tick that raced a
/// cancellation is harmless. Dropping the handle aborts the task.
pub struct SectionTimer {
    epoch: TimerEpoch,
    handle: JoinHandle<()>,
}

impl SectionTimer {
    /// Arms a one-second repeating tick for the given epoch.
    #[must_use]
    pub fn spawn(epoch: TimerEpoch, events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if events.send(TimerEvent { epoch }).is_err() {
                    break;
                }
            }
        });
        Self { epoch, handle }
    }

    #[must_use]
    pub fn epoch(&self) -> TimerEpoch {
        self.epoch
    }

    /// Stops the tick task. Events already queued still drain through the
    /// channel, where the machine's epoch check disposes of them.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for SectionTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
