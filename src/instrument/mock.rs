//! Mock analyzer that generates synthetic readings.
//!
//! Two response sources are available: a scripted sequence of values handed
//! back one per sample, and a beam pattern coupled to a mock turntable's
//! simulated position. Both are deterministic so tests can assert exact
//! outcomes.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::{Measurement, Sampler};
use crate::hardware::mock::MockPositionProbe;

type Pattern = dyn Fn(f64) -> f64 + Send + Sync;

enum ResponseSource {
    Scripted(VecDeque<f64>),
    Coupled {
        probe: MockPositionProbe,
        pattern: Arc<Pattern>,
    },
}

struct AnalyzerState {
    source: ResponseSource,
    samples_taken: usize,
    fail_after: Option<usize>,
    sample_delay: Option<Duration>,
    emit_traces: bool,
}

/// Deterministic fake measurement instrument.
#[derive(Clone)]
pub struct MockAnalyzer {
    state: Arc<Mutex<AnalyzerState>>,
}

impl MockAnalyzer {
    fn from_source(source: ResponseSource) -> Self {
        Self {
            state: Arc::new(Mutex::new(AnalyzerState {
                source,
                samples_taken: 0,
                fail_after: None,
                sample_delay: None,
                emit_traces: false,
            })),
        }
    }

    /// Return `values` in order, one per sample; erroring once exhausted.
    pub fn scripted(values: Vec<f64>) -> Self {
        Self::from_source(ResponseSource::Scripted(values.into()))
    }

    /// Evaluate `pattern` at the coupled turntable's position per sample.
    pub fn coupled(probe: MockPositionProbe, pattern: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::from_source(ResponseSource::Coupled {
            probe,
            pattern: Arc::new(pattern),
        })
    }

    /// A unimodal received-power pattern in dB peaking at `peak_degrees`.
    pub fn beam_pattern(probe: MockPositionProbe, peak_degrees: f64) -> Self {
        Self::coupled(probe, move |position| {
            -0.02 * (position - peak_degrees).powi(2)
        })
    }

    /// Fail with a connection error on the `n`-th sample (1-based).
    pub async fn fail_on_sample(self, n: usize) -> Self {
        self.state.lock().await.fail_after = Some(n);
        self
    }

    /// Simulate instrument sweep time per sample.
    pub async fn with_sample_delay(self, delay: Duration) -> Self {
        self.state.lock().await.sample_delay = Some(delay);
        self
    }

    /// Wrap every reading in a three-point frequency trace whose first
    /// element carries the scalar.
    pub async fn emitting_traces(self) -> Self {
        self.state.lock().await.emit_traces = true;
        self
    }
}

#[async_trait]
impl Sampler for MockAnalyzer {
    async fn sample(&mut self) -> Result<Measurement> {
        let delay = {
            let state = self.state.lock().await;
            state.sample_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.samples_taken += 1;
        if state.fail_after == Some(state.samples_taken) {
            return Err(anyhow!("lost connection to analyzer"));
        }

        let value = match &mut state.source {
            ResponseSource::Scripted(values) => values
                .pop_front()
                .ok_or_else(|| anyhow!("scripted response sequence exhausted"))?,
            ResponseSource::Coupled { probe, pattern } => {
                let position = probe.degrees().await;
                pattern(position)
            }
        };

        if state.emit_traces {
            Ok(Measurement::Trace {
                frequencies: vec![2.40e9, 2.45e9, 2.50e9],
                values: vec![value, value - 0.5, value - 1.0],
                unit: "dB".to_string(),
            })
        } else {
            Ok(Measurement::Scalar {
                value,
                unit: "dB".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_values_in_order() {
        let mut analyzer = MockAnalyzer::scripted(vec![1.0, 2.0]);
        assert_eq!(analyzer.sample().await.unwrap().primary_scalar(), Some(1.0));
        assert_eq!(analyzer.sample().await.unwrap().primary_scalar(), Some(2.0));
        assert!(analyzer.sample().await.is_err());
    }

    #[tokio::test]
    async fn test_fail_on_sample() {
        let mut analyzer = MockAnalyzer::scripted(vec![1.0, 2.0, 3.0])
            .fail_on_sample(2)
            .await;
        assert!(analyzer.sample().await.is_ok());
        assert!(analyzer.sample().await.is_err());
    }

    #[tokio::test]
    async fn test_beam_pattern_peaks_at_peak() {
        let table = crate::hardware::mock::MockTurntable::new()
            .with_initial_position(140.0)
            .await;
        let mut analyzer = MockAnalyzer::beam_pattern(table.probe(), 140.0);
        assert_eq!(analyzer.sample().await.unwrap().primary_scalar(), Some(0.0));
    }

    #[tokio::test]
    async fn test_trace_mode_carries_scalar_first() {
        let mut analyzer = MockAnalyzer::scripted(vec![-7.5]).emitting_traces().await;
        let measurement = analyzer.sample().await.unwrap();
        assert_eq!(measurement.primary_scalar(), Some(-7.5));
        assert!(matches!(measurement, Measurement::Trace { .. }));
    }
}
