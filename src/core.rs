//! Core traits and data types for the sweep application.
//!
//! This module defines the foundational abstractions the rest of the crate is
//! built on: the [`Positioner`] and [`Sampler`] device traits and the
//! measurement/sample data model.
//!
//! # Architecture Overview
//!
//! The scan loop never talks to concrete hardware. It drives a boxed
//! [`Positioner`] (the turntable) and a boxed [`Sampler`] (the network
//! analyzer); production code backs the traits with the vendor drivers in
//! `hardware`/`instrument`, tests back them with the deterministic mocks.
//!
//! # Thread Safety
//!
//! Both traits require `Send` so each device can be moved into the worker
//! task that exclusively owns it for the duration of a sweep. There is no
//! shared access to a device: only the actuator worker calls the
//! [`Positioner`], only the sensor worker calls the [`Sampler`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll interval used by the default [`Positioner::wait_idle`] loop.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sense of rotation for turntable moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Positive (clockwise) rotation.
    Clockwise,
    /// Negative (counter-clockwise) rotation.
    CounterClockwise,
}

impl Direction {
    /// The reverse sense, used when retracing back into the swept range.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }
}

/// Acceleration ramp shapes supported by the turntable controller.
///
/// The variants mirror the controller's built-in acceleration functions; the
/// wire encoding is the driver's concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationProfile {
    Impulse,
    Steep,
    Medium,
    Flat,
}

/// Velocity and acceleration settings handed through to the actuator.
///
/// The scan loop treats this as opaque; it is applied once during homing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionProfile {
    /// Rotation speed in revolutions per minute.
    pub velocity_rpm: f64,
    /// Acceleration ramp shape.
    pub acceleration: AccelerationProfile,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            velocity_rpm: 2.0,
            acceleration: AccelerationProfile::Flat,
        }
    }
}

/// A single reading produced by the measurement instrument.
///
/// Either a plain scalar (received power) or a paired frequency/response
/// trace from an S-parameter sweep. The scan loop treats the payload as
/// opaque except for [`Measurement::primary_scalar`], which yields the value
/// used for best-position selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    /// Single scalar reading.
    Scalar {
        /// Measured value.
        value: f64,
        /// Physical unit, e.g. `"dB"`.
        unit: String,
    },
    /// Frequency sweep trace.
    Trace {
        /// Stimulus frequencies in Hz.
        frequencies: Vec<f64>,
        /// Response value per frequency point.
        values: Vec<f64>,
        /// Physical unit of the response values.
        unit: String,
    },
}

impl Measurement {
    /// The scalar component used for max-selection: the scalar itself, or
    /// the first element of the response trace. `None` for an empty trace.
    pub fn primary_scalar(&self) -> Option<f64> {
        match self {
            Measurement::Scalar { value, .. } => Some(*value),
            Measurement::Trace { values, .. } => values.first().copied(),
        }
    }
}

/// One recorded point of the position-indexed series.
///
/// Created exactly once per completed handshake round and immutable after
/// that. Insertion order equals temporal order equals position order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Turntable position in whole degrees at the time of sampling.
    pub position: f64,
    /// The reading taken at that position.
    pub value: Measurement,
    /// UTC timestamp of the sample.
    pub timestamp: DateTime<Utc>,
}

impl SamplePoint {
    /// Record a sample at `position`, stamped now.
    pub fn new(position: f64, value: Measurement) -> Self {
        Self {
            position,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Primary scalar of the reading, `-inf` when the reading has none.
    pub fn scalar(&self) -> f64 {
        self.value.primary_scalar().unwrap_or(f64::NEG_INFINITY)
    }
}

/// Capability trait for the rotational actuator.
///
/// Motion commands are non-blocking on the device side; [`wait_idle`]
/// is the sole suspension point. Implementations report errors with
/// `anyhow` context; the orchestrator wraps them into typed faults.
///
/// [`wait_idle`]: Positioner::wait_idle
#[async_trait]
pub trait Positioner: Send {
    /// Present angle in degrees. No side effect.
    async fn position(&self) -> Result<f64>;

    /// Step by `degrees` in `direction`.
    async fn move_relative(&mut self, degrees: f64, direction: Direction) -> Result<()>;

    /// Go to the absolute angle `degrees`, approaching in `direction`.
    async fn move_absolute(&mut self, degrees: f64, direction: Direction) -> Result<()>;

    /// Whether the table is currently in motion.
    async fn is_moving(&self) -> Result<bool>;

    /// Best-effort abort of any in-progress motion. Idempotent.
    async fn stop(&mut self) -> Result<()>;

    /// Apply velocity and acceleration settings.
    async fn configure(&mut self, motion: &MotionProfile) -> Result<()>;

    /// Block until the table reports not-moving or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout; that is not an error, the caller
    /// decides how to react.
    async fn wait_idle(&self, timeout: Duration) -> Result<bool> {
        let started = tokio::time::Instant::now();
        loop {
            if !self.is_moving().await? {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

/// Capability trait for the measurement instrument.
#[async_trait]
pub trait Sampler: Send {
    /// Take one measurement for the current state. Blocks for the duration
    /// of a single sweep/averaging cycle of the instrument.
    async fn sample(&mut self) -> Result<Measurement>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Clockwise.opposite(), Direction::CounterClockwise);
        assert_eq!(
            Direction::CounterClockwise.opposite(),
            Direction::Clockwise
        );
    }

    #[test]
    fn test_primary_scalar_of_scalar() {
        let m = Measurement::Scalar {
            value: -3.2,
            unit: "dB".to_string(),
        };
        assert_eq!(m.primary_scalar(), Some(-3.2));
    }

    #[test]
    fn test_primary_scalar_of_trace() {
        let m = Measurement::Trace {
            frequencies: vec![1.0e9, 2.0e9],
            values: vec![-10.5, -40.0],
            unit: "dB".to_string(),
        };
        assert_eq!(m.primary_scalar(), Some(-10.5));
    }

    #[test]
    fn test_primary_scalar_of_empty_trace() {
        let m = Measurement::Trace {
            frequencies: vec![],
            values: vec![],
            unit: "dB".to_string(),
        };
        assert_eq!(m.primary_scalar(), None);
    }

    #[test]
    fn test_sample_point_scalar_fallback() {
        let p = SamplePoint::new(
            10.0,
            Measurement::Trace {
                frequencies: vec![],
                values: vec![],
                unit: "dB".to_string(),
            },
        );
        assert_eq!(p.scalar(), f64::NEG_INFINITY);
    }
}
