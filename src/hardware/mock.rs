//! Mock turntable for tests and hardware-free runs.
//!
//! Simulates the rotational actuator with configurable motion timing and
//! fault injection. All operations are async-safe (tokio time, never
//! `std::thread::sleep`), and the internal state sits behind an `Arc` so a
//! test can keep a cloned handle while the orchestrator owns the device.
//!
//! # Fault injection
//!
//! - [`MockTurntable::stuck`]: the table never reports idle, so every
//!   `wait_idle` times out.
//! - [`MockTurntable::illegal_readback_after`]: one bogus position readback
//!   after the n-th relative move.
//! - [`MockTurntable::reject_relative_move`]: the n-th relative move is
//!   rejected by the "device".

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::core::{Direction, MotionProfile, Positioner};

#[derive(Debug, Default)]
struct TurntableState {
    position: f64,
    moving_until: Option<Instant>,
    move_delay: Option<Duration>,
    stuck: bool,
    illegal_readback: Option<(u32, f64)>,
    reject_move: Option<u32>,
    relative_moves: u32,
    absolute_moves: Vec<f64>,
    stops: u32,
    motion: Option<MotionProfile>,
}

impl TurntableState {
    fn begin_motion(&mut self) {
        if let Some(delay) = self.move_delay {
            self.moving_until = Some(Instant::now() + delay);
        }
    }
}

/// Snapshot of everything the mock observed, for test assertions.
#[derive(Clone, Debug)]
pub struct MockTurntableLog {
    /// Number of relative moves commanded.
    pub relative_moves: u32,
    /// Targets of all absolute moves, in order.
    pub absolute_moves: Vec<f64>,
    /// Number of stop commands.
    pub stops: u32,
    /// Motion profile applied via `configure`, if any.
    pub motion: Option<MotionProfile>,
}

/// Cloneable read-only view of the mock's position, for coupling a mock
/// analyzer to the simulated table.
#[derive(Clone, Debug)]
pub struct MockPositionProbe {
    state: Arc<Mutex<TurntableState>>,
}

impl MockPositionProbe {
    /// Present simulated angle in degrees.
    pub async fn degrees(&self) -> f64 {
        self.state.lock().await.position
    }
}

/// Deterministic fake actuator.
#[derive(Clone, Debug, Default)]
pub struct MockTurntable {
    state: Arc<Mutex<TurntableState>>,
}

impl MockTurntable {
    /// New table at 0.0 degrees, settling instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the table at `degrees` instead of zero.
    pub async fn with_initial_position(self, degrees: f64) -> Self {
        self.state.lock().await.position = degrees;
        self
    }

    /// Simulate moves taking `delay` before the table reports idle.
    pub async fn with_move_delay(self, delay: Duration) -> Self {
        self.state.lock().await.move_delay = Some(delay);
        self
    }

    /// Never report idle again; every `wait_idle` will time out.
    pub async fn stuck(self) -> Self {
        self.state.lock().await.stuck = true;
        self
    }

    /// After the `n`-th relative move, report `raw_degrees` once from
    /// `position()` instead of the simulated angle.
    pub async fn illegal_readback_after(self, n: u32, raw_degrees: f64) -> Self {
        self.state.lock().await.illegal_readback = Some((n, raw_degrees));
        self
    }

    /// Reject the `n`-th relative move with a device error.
    pub async fn reject_relative_move(self, n: u32) -> Self {
        self.state.lock().await.reject_move = Some(n);
        self
    }

    /// Read-only position handle for coupling a mock analyzer.
    pub fn probe(&self) -> MockPositionProbe {
        MockPositionProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// Everything the mock observed so far.
    pub async fn history(&self) -> MockTurntableLog {
        let state = self.state.lock().await;
        MockTurntableLog {
            relative_moves: state.relative_moves,
            absolute_moves: state.absolute_moves.clone(),
            stops: state.stops,
            motion: state.motion,
        }
    }
}

#[async_trait]
impl Positioner for MockTurntable {
    async fn position(&self) -> Result<f64> {
        let mut state = self.state.lock().await;
        if let Some((after, raw)) = state.illegal_readback {
            if state.relative_moves >= after {
                state.illegal_readback = None;
                return Ok(raw);
            }
        }
        Ok(state.position)
    }

    async fn move_relative(&mut self, degrees: f64, direction: Direction) -> Result<()> {
        let mut state = self.state.lock().await;
        state.relative_moves += 1;
        if state.reject_move == Some(state.relative_moves) {
            return Err(anyhow!("turntable rejected step command"));
        }
        if !state.stuck {
            match direction {
                Direction::Clockwise => state.position += degrees,
                Direction::CounterClockwise => state.position -= degrees,
            }
        }
        state.begin_motion();
        Ok(())
    }

    async fn move_absolute(&mut self, degrees: f64, _direction: Direction) -> Result<()> {
        let mut state = self.state.lock().await;
        state.absolute_moves.push(degrees);
        state.position = degrees;
        state.begin_motion();
        Ok(())
    }

    async fn is_moving(&self) -> Result<bool> {
        let state = self.state.lock().await;
        if state.stuck {
            return Ok(true);
        }
        Ok(state
            .moving_until
            .is_some_and(|until| Instant::now() < until))
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stops += 1;
        state.moving_until = None;
        Ok(())
    }

    async fn configure(&mut self, motion: &MotionProfile) -> Result<()> {
        self.state.lock().await.motion = Some(*motion);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relative_moves_accumulate() {
        let mut table = MockTurntable::new();
        table.move_relative(10.0, Direction::Clockwise).await.unwrap();
        table.move_relative(10.0, Direction::Clockwise).await.unwrap();
        assert_eq!(table.position().await.unwrap(), 20.0);
    }

    #[tokio::test]
    async fn test_counter_clockwise_moves_subtract() {
        let mut table = MockTurntable::new().with_initial_position(90.0).await;
        table
            .move_relative(30.0, Direction::CounterClockwise)
            .await
            .unwrap();
        assert_eq!(table.position().await.unwrap(), 60.0);
    }

    #[tokio::test]
    async fn test_illegal_readback_fires_once() {
        let mut table = MockTurntable::new().illegal_readback_after(1, 400.0).await;
        table.move_relative(10.0, Direction::Clockwise).await.unwrap();
        assert_eq!(table.position().await.unwrap(), 400.0);
        assert_eq!(table.position().await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_stuck_table_times_out() {
        let table = MockTurntable::new().stuck().await;
        let settled = table.wait_idle(Duration::from_millis(20)).await.unwrap();
        assert!(!settled);
    }

    #[tokio::test]
    async fn test_move_delay_settles() {
        let mut table = MockTurntable::new()
            .with_move_delay(Duration::from_millis(10))
            .await;
        table.move_relative(5.0, Direction::Clockwise).await.unwrap();
        assert!(table.is_moving().await.unwrap());
        let settled = table.wait_idle(Duration::from_secs(1)).await.unwrap();
        assert!(settled);
    }
}
