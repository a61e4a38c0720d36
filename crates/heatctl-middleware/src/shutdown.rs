//! Cooperative stop signal shared by every long-running task.
//!
//! One [`ShutdownTrigger`] fans out to any number of [`ShutdownSignal`]
//! clones.  Tasks `select!` on [`ShutdownSignal::wait`] next to their normal
//! work so they exit between processing steps.  Dropping the trigger counts
//! as a stop request.

use tokio::sync::watch;

/// Sending half: flip once to stop everything.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half held by each task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Request a stop.  Safe to call from a non-async context such as a
    /// Ctrl-C handler, and idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// `true` once a stop has been requested or the trigger was dropped.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve when a stop is requested.
    pub async fn wait(&mut self) {
        // An Err means the trigger is gone, which is also a stop.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let (trigger, mut signal) = channel();
        assert!(!signal.is_triggered());
        trigger.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("signal must resolve");
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn dropping_trigger_counts_as_stop() {
        let (trigger, mut signal) = channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("signal must resolve when trigger is dropped");
        assert!(signal.is_triggered());
    }

    #[test]
    fn cloned_signal_sees_stop() {
        let (trigger, signal) = channel();
        let late = signal.clone();
        trigger.trigger();
        assert!(late.is_triggered());
    }
}
