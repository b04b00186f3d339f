//! Shared scan state, the only data touched by both workers.
//!
//! The lock lives with the data. Every access goes through the accessors
//! below, each a scoped critical section; nothing reads or writes the fields
//! unlocked. `scan_ended` is set by the actuator worker at natural
//! termination, and by either worker on a fatal fault so the peer can get
//! out of its wait.

use tokio::sync::Mutex;

#[derive(Debug)]
struct StateInner {
    current_position: f64,
    scan_ended: bool,
}

/// Lock-protected position/termination state shared by the two workers.
#[derive(Debug)]
pub(crate) struct SharedScanState {
    inner: Mutex<StateInner>,
}

impl SharedScanState {
    pub(crate) fn new(initial_position: f64) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                current_position: initial_position,
                scan_ended: false,
            }),
        }
    }

    /// Publish the committed position for the current round.
    pub(crate) async fn commit_position(&self, position: f64) {
        self.inner.lock().await.current_position = position;
    }

    /// Read the last committed position.
    pub(crate) async fn position(&self) -> f64 {
        self.inner.lock().await.current_position
    }

    /// Flag the sweep as over.
    pub(crate) async fn end_scan(&self) {
        self.inner.lock().await.scan_ended = true;
    }

    /// Whether the sweep has been flagged as over.
    pub(crate) async fn ended(&self) -> bool {
        self.inner.lock().await.scan_ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_and_read_position() {
        let state = SharedScanState::new(0.0);
        state.commit_position(120.0).await;
        assert_eq!(state.position().await, 120.0);
    }

    #[tokio::test]
    async fn test_end_flag_starts_clear() {
        let state = SharedScanState::new(0.0);
        assert!(!state.ended().await);
        state.end_scan().await;
        assert!(state.ended().await);
    }
}
