//! Synchronized sweep orchestration.
//!
//! A sweep steps the turntable through `start + k * increment` positions,
//! takes one analyzer reading per position, and ends with the table parked
//! at the position of maximum response. [`ScanConfig`] describes the sweep,
//! [`ScanOrchestrator`] executes it, [`ScanRecord`] is what comes back.

pub mod bounds;
mod handshake;
mod orchestrator;
mod state;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Direction, MotionProfile, SamplePoint};
use crate::error::ScanError;

pub use bounds::{BoundsGuard, LegalRange, PositionCheck};
pub use orchestrator::ScanOrchestrator;

/// Immutable sweep parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// First sampled position in degrees.
    pub start_position: f64,
    /// Exclusive upper bound of the sweep in degrees.
    pub end_position: f64,
    /// Step size per round in degrees; always positive, the sense of
    /// rotation comes from `direction`.
    pub increment: f64,
    /// Sense of rotation for the stepping moves.
    pub direction: Direction,
    /// Angular interval outside which the actuator counts as faulted.
    pub legal_range: LegalRange,
    /// Upper bound on waiting for the actuator to settle after a move.
    #[serde(with = "humantime_serde")]
    pub actuator_timeout: Duration,
    /// Velocity/acceleration settings handed through to the actuator.
    pub motion: MotionProfile,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_position: 0.0,
            end_position: 270.0,
            increment: 10.0,
            direction: Direction::Clockwise,
            legal_range: LegalRange {
                min: 0.0,
                max: 270.0,
            },
            actuator_timeout: Duration::from_secs(120),
            motion: MotionProfile::default(),
        }
    }
}

impl ScanConfig {
    /// Check the semantic invariants the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ScanError> {
        if !(self.increment > 0.0) {
            return Err(ScanError::Configuration(format!(
                "increment must be positive, got {}",
                self.increment
            )));
        }
        if self.end_position <= self.start_position {
            return Err(ScanError::Configuration(format!(
                "end position {} must lie beyond start position {}",
                self.end_position, self.start_position
            )));
        }
        if self.legal_range.min >= self.legal_range.max {
            return Err(ScanError::Configuration(format!(
                "legal range [{}, {}] is empty",
                self.legal_range.min, self.legal_range.max
            )));
        }
        if !self.legal_range.contains(self.start_position) {
            return Err(ScanError::Configuration(format!(
                "start position {} lies outside the legal range [{}, {}]",
                self.start_position, self.legal_range.min, self.legal_range.max
            )));
        }
        if self.actuator_timeout.is_zero() {
            return Err(ScanError::Configuration(
                "actuator timeout must be non-zero".to_string(),
            ));
        }
        if !(self.motion.velocity_rpm > 0.0) {
            return Err(ScanError::Configuration(format!(
                "velocity must be positive, got {} rpm",
                self.motion.velocity_rpm
            )));
        }
        Ok(())
    }
}

/// A completed sweep: the ordered series and its best sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Samples in round order, one per position.
    pub series: Vec<SamplePoint>,
    /// The sample with the maximal primary scalar; ties resolve to the
    /// lowest position.
    pub best: SamplePoint,
}

/// Positions are recorded and compared in whole degrees to absorb actuator
/// read noise and keep the termination test well-defined under float drift.
pub(crate) fn round_degrees(degrees: f64) -> f64 {
    degrees.round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ScanConfig::default().validate().expect("default must pass");
    }

    #[test]
    fn test_rejects_zero_increment() {
        let config = ScanConfig {
            increment: 0.0,
            ..ScanConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScanError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_negative_increment() {
        let config = ScanConfig {
            increment: -10.0,
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_end_before_start() {
        let config = ScanConfig {
            start_position: 180.0,
            end_position: 90.0,
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_start_outside_legal_range() {
        let config = ScanConfig {
            start_position: 300.0,
            end_position: 350.0,
            legal_range: LegalRange {
                min: 0.0,
                max: 270.0,
            },
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_legal_range() {
        let config = ScanConfig {
            legal_range: LegalRange {
                min: 270.0,
                max: 0.0,
            },
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_degrees_absorbs_drift() {
        assert_eq!(round_degrees(259.99999), 260.0);
        assert_eq!(round_degrees(10.4), 10.0);
    }
}
