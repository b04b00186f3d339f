//! Edge-triggered round signals for the two-worker handshake.
//!
//! Each round of the sweep is synchronized by a pair of binary signals:
//! "ready" (actuator worker to sensor worker: the position for this round is
//! committed) and "done" (sensor worker to actuator worker: the sample for
//! this round is recorded). A raise stores at most one permit and a wait
//! consumes it, so the exchange behaves like a capacity-1 channel handed
//! back and forth once per round. Raising before the peer is parked does not
//! lose the wakeup, and repeated raises before a wait coalesce into one.

use tokio::sync::Notify;

/// A single auto-resetting signal.
#[derive(Debug, Default)]
pub(crate) struct EdgeSignal {
    notify: Notify,
}

impl EdgeSignal {
    /// Wake the waiting peer, or store one permit if none is parked yet.
    pub(crate) fn raise(&self) {
        self.notify.notify_one();
    }

    /// Block until a permit is available, consuming it.
    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// The paired ready/done signals exchanged each round.
#[derive(Debug, Default)]
pub(crate) struct Handshake {
    /// Raised by the actuator worker once the round's position is committed.
    pub(crate) ready: EdgeSignal,
    /// Raised by the sensor worker once the round's sample is recorded.
    pub(crate) done: EdgeSignal,
}

impl Handshake {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_raise_before_wait_is_not_lost() {
        let signal = EdgeSignal::default();
        signal.raise();
        timeout(Duration::from_millis(10), signal.wait())
            .await
            .expect("stored permit should satisfy the wait");
    }

    #[tokio::test]
    async fn test_wait_without_raise_pends() {
        let signal = EdgeSignal::default();
        let mut wait = tokio_test::task::spawn(signal.wait());
        tokio_test::assert_pending!(wait.poll());
    }

    #[tokio::test]
    async fn test_permit_is_consumed_once() {
        let signal = EdgeSignal::default();
        signal.raise();
        signal.raise();
        timeout(Duration::from_millis(10), signal.wait())
            .await
            .expect("first wait consumes the coalesced permit");
        assert!(
            timeout(Duration::from_millis(10), signal.wait())
                .await
                .is_err(),
            "second wait must pend"
        );
    }
}
