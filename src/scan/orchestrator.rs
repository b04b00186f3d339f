//! The synchronized scan loop.
//!
//! Two concurrently-running workers cooperate over [`SharedScanState`] and
//! the [`Handshake`] signals:
//!
//! - the **actuator worker** owns the [`Positioner`]. It homes the table to
//!   the start position, then steps it one increment per round, committing
//!   the rounded readback under lock before raising "ready".
//! - the **sensor worker** owns the [`Sampler`]. On each "ready" edge it
//!   takes one measurement, pairs it with the committed position, and raises
//!   "done".
//!
//! ```text
//! Homing -> Stepping <-> Measuring -> Finished -> Repositioning -> Done
//! ```
//!
//! The round loop is bounded by the logical position ladder
//! `start + k * increment`, not by the device readback, so a stuck table
//! still terminates after the expected number of rounds. When the ladder
//! would reach or pass the end position the actuator worker raises one final
//! "ready" with the ended flag set, releasing a sensor worker that would
//! otherwise wait forever.
//!
//! A worker that dies flags the scan as ended and raises its outgoing signal
//! before returning, so the peer can never block on it. The caller of
//! [`ScanOrchestrator::run`] sees either a complete [`ScanRecord`] or exactly
//! one terminal fault; a truncated series is never handed back.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::{Positioner, SamplePoint, Sampler};
use crate::error::ScanError;
use crate::scan::bounds::{BoundsGuard, PositionCheck};
use crate::scan::handshake::Handshake;
use crate::scan::state::SharedScanState;
use crate::scan::{round_degrees, ScanConfig, ScanRecord};

/// Corrective moves allowed while homing before giving up.
const MAX_HOMING_MOVES: u32 = 5;

/// Owns one sweep: configuration, the two devices, and the worker lifetimes.
pub struct ScanOrchestrator {
    config: ScanConfig,
    positioner: Box<dyn Positioner + Sync>,
    sampler: Box<dyn Sampler>,
}

impl ScanOrchestrator {
    /// Bundle a validated-on-run configuration with the two devices.
    pub fn new(
        config: ScanConfig,
        positioner: Box<dyn Positioner + Sync>,
        sampler: Box<dyn Sampler>,
    ) -> Self {
        Self {
            config,
            positioner,
            sampler,
        }
    }

    /// Run the sweep to completion.
    ///
    /// Synchronous from the caller's perspective; all concurrency is
    /// internal. Returns the recorded series with its best sample, the
    /// table parked at the best-found position.
    pub async fn run(self) -> Result<ScanRecord, ScanError> {
        self.config.validate()?;

        let shared = Arc::new(SharedScanState::new(round_degrees(
            self.config.start_position,
        )));
        let handshake = Arc::new(Handshake::new());
        let (best_tx, best_rx) = oneshot::channel();

        let actuator = tokio::spawn(actuator_worker(
            self.positioner,
            self.config.clone(),
            Arc::clone(&shared),
            Arc::clone(&handshake),
            best_rx,
        ));
        let sensor = tokio::spawn(sensor_worker(
            self.sampler,
            Arc::clone(&shared),
            Arc::clone(&handshake),
        ));

        let sensor_outcome = sensor.await?;
        match &sensor_outcome {
            // Hand the best-found position to the actuator worker for the
            // final repositioning move. The send fails only when the worker
            // already died; its own fault is surfaced below.
            Ok(record) => {
                let _ = best_tx.send(record.best.position);
            }
            Err(_) => drop(best_tx),
        }
        let actuator_outcome = actuator.await?;

        actuator_outcome?;
        sensor_outcome
    }
}

async fn actuator_worker(
    mut positioner: Box<dyn Positioner + Sync>,
    config: ScanConfig,
    shared: Arc<SharedScanState>,
    handshake: Arc<Handshake>,
    best_rx: oneshot::Receiver<f64>,
) -> Result<(), ScanError> {
    let outcome = drive_sweep(positioner.as_mut(), &config, &shared, &handshake).await;

    // Release a sensor worker parked on "ready", on every exit path.
    shared.end_scan().await;
    handshake.ready.raise();
    outcome?;

    // Repositioning: the physical goal of the sweep is to park the table at
    // the best-found orientation. The sender is dropped when the sweep
    // produced no usable record.
    if let Ok(best) = best_rx.await {
        info!(position = best, "repositioning to best-found position");
        positioner
            .move_absolute(best, config.direction.opposite())
            .await
            .map_err(ScanError::Actuator)?;
        if !positioner
            .wait_idle(config.actuator_timeout)
            .await
            .map_err(ScanError::Actuator)?
        {
            warn!(position = best, "timed out waiting for the final repositioning move");
        }
    }
    Ok(())
}

/// Homing plus the stepping rounds. Fatal faults propagate to the caller,
/// which owns the unblock-the-peer cleanup.
async fn drive_sweep(
    positioner: &mut (dyn Positioner + Sync),
    config: &ScanConfig,
    shared: &SharedScanState,
    handshake: &Handshake,
) -> Result<(), ScanError> {
    home(positioner, config).await?;
    shared
        .commit_position(round_degrees(config.start_position))
        .await;

    let guard = BoundsGuard::new(config.legal_range);
    let end = round_degrees(config.end_position);
    let mut ladder = round_degrees(config.start_position);
    let mut round: u32 = 0;

    loop {
        handshake.ready.raise();
        handshake.done.wait().await;
        if shared.ended().await {
            warn!(round, "sweep flagged as ended early, stopping");
            return Ok(());
        }

        let next = round_degrees(ladder + config.increment);
        if next >= end {
            debug!(rounds = round + 1, "sweep ladder exhausted");
            return Ok(());
        }

        positioner
            .move_relative(config.increment, config.direction)
            .await
            .map_err(ScanError::Actuator)?;
        if !positioner
            .wait_idle(config.actuator_timeout)
            .await
            .map_err(ScanError::Actuator)?
        {
            warn!(
                round,
                timeout = ?config.actuator_timeout,
                "actuator did not settle in time, continuing with last readback"
            );
        }
        round += 1;
        ladder = next;

        let readback = round_degrees(positioner.position().await.map_err(ScanError::Actuator)?);
        match guard.classify(readback) {
            PositionCheck::Legal => shared.commit_position(readback).await,
            PositionCheck::Illegal => {
                warn!(position = readback, "current position is illegal, resetting");
                recover(positioner, config, ladder).await?;
                shared.commit_position(ladder).await;
            }
        }
    }
}

/// Move to the start position with a bounded number of corrective moves.
async fn home(positioner: &mut (dyn Positioner + Sync), config: &ScanConfig) -> Result<(), ScanError> {
    positioner
        .configure(&config.motion)
        .await
        .map_err(|err| ScanError::Setup(format!("unable to apply motion profile: {err}")))?;

    let start = round_degrees(config.start_position);
    for _ in 0..MAX_HOMING_MOVES {
        let current = round_degrees(positioner.position().await.map_err(ScanError::Actuator)?);
        if current == start {
            info!(position = start, "actuator homed to start position");
            return Ok(());
        }
        info!(
            current,
            start, "current position is not start position, moving to start"
        );
        positioner
            .move_absolute(config.start_position, config.direction)
            .await
            .map_err(ScanError::Actuator)?;
        if !positioner
            .wait_idle(config.actuator_timeout)
            .await
            .map_err(ScanError::Actuator)?
        {
            warn!("timed out waiting for a homing move to settle");
        }
    }
    Err(ScanError::Setup(format!(
        "homing did not converge to {start} degrees within {MAX_HOMING_MOVES} corrective moves"
    )))
}

/// Recovery from an illegal position readback: stop, retrace to the start
/// position, then rejoin the logical ladder at the violated round's target.
async fn recover(
    positioner: &mut (dyn Positioner + Sync),
    config: &ScanConfig,
    target: f64,
) -> Result<(), ScanError> {
    positioner.stop().await.map_err(ScanError::Actuator)?;
    positioner
        .move_absolute(config.start_position, config.direction.opposite())
        .await
        .map_err(ScanError::Actuator)?;
    if !positioner
        .wait_idle(config.actuator_timeout)
        .await
        .map_err(ScanError::Actuator)?
    {
        warn!("timed out returning to start during recovery");
    }
    positioner
        .move_absolute(target, config.direction)
        .await
        .map_err(ScanError::Actuator)?;
    if !positioner
        .wait_idle(config.actuator_timeout)
        .await
        .map_err(ScanError::Actuator)?
    {
        warn!(position = target, "timed out rejoining the sweep after recovery");
    }
    Ok(())
}

async fn sensor_worker(
    mut sampler: Box<dyn Sampler>,
    shared: Arc<SharedScanState>,
    handshake: Arc<Handshake>,
) -> Result<ScanRecord, ScanError> {
    let mut series: Vec<SamplePoint> = Vec::new();

    loop {
        handshake.ready.wait().await;
        if shared.ended().await {
            break;
        }

        let measurement = match sampler.sample().await {
            Ok(m) => m,
            Err(err) => {
                shared.end_scan().await;
                handshake.done.raise();
                return Err(ScanError::Sensor(err));
            }
        };
        if !measurement.primary_scalar().is_some_and(f64::is_finite) {
            shared.end_scan().await;
            handshake.done.raise();
            return Err(ScanError::Sensor(anyhow!(
                "instrument returned an unusable reading: {measurement:?}"
            )));
        }

        let position = shared.position().await;
        debug!(position, "sample recorded");
        series.push(SamplePoint::new(position, measurement));
        handshake.done.raise();
    }

    let best = select_best(&series)
        .ok_or_else(|| ScanError::Sensor(anyhow!("sweep ended before any sample was recorded")))?
        .clone();
    info!(
        samples = series.len(),
        best_position = best.position,
        best_value = best.scalar(),
        "sweep finished"
    );
    Ok(ScanRecord { series, best })
}

/// The sample with the maximal primary scalar; the earliest occurrence wins
/// ties, which for a monotonic sweep is also the lowest position.
fn select_best(series: &[SamplePoint]) -> Option<&SamplePoint> {
    series
        .iter()
        .reduce(|best, point| if point.scalar() > best.scalar() { point } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Measurement;

    fn scalar(position: f64, value: f64) -> SamplePoint {
        SamplePoint::new(
            position,
            Measurement::Scalar {
                value,
                unit: "dB".to_string(),
            },
        )
    }

    #[test]
    fn test_select_best_prefers_maximum() {
        let series = vec![scalar(0.0, 1.0), scalar(10.0, 7.0), scalar(20.0, 4.0)];
        let best = select_best(&series).expect("non-empty series");
        assert_eq!(best.position, 10.0);
    }

    #[test]
    fn test_select_best_tie_takes_lowest_position() {
        let series = vec![
            scalar(0.0, 5.0),
            scalar(10.0, 9.0),
            scalar(20.0, 9.0),
            scalar(30.0, 3.0),
        ];
        let best = select_best(&series).expect("non-empty series");
        assert_eq!(best.position, 10.0);
        assert_eq!(best.scalar(), 9.0);
    }

    #[test]
    fn test_select_best_of_empty_series() {
        assert!(select_best(&[]).is_none());
    }
}
