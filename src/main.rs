//! Command-line sweep runner.
//!
//! Wires settings to devices, runs one synchronized sweep, and parks the
//! turntable at the best-found position. The process exit policy lives
//! here; the library only ever returns typed faults.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use beamsteer::config::{DeviceKind, Settings};
use beamsteer::core::{Positioner, Sampler};
use beamsteer::hardware::mock::MockTurntable;
use beamsteer::instrument::mock::MockAnalyzer;
use beamsteer::instrument::vna::VnaAnalyzer;
use beamsteer::scan::ScanOrchestrator;

/// Angle the built-in mock beam pattern peaks at, for hardware-free runs.
const MOCK_PEAK_DEGREES: f64 = 140.0;

#[derive(Parser)]
#[command(
    name = "beamsteer",
    about = "Turntable sweep with per-position analyzer sampling"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use mock devices regardless of the configured device kinds.
    #[arg(long)]
    mock: bool,

    /// Print the completed scan record as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.application.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(name = %settings.application.name, "starting sweep");

    let (positioner, sampler) = build_devices(&settings, cli.mock).await?;
    let record = ScanOrchestrator::new(settings.scan.clone(), positioner, sampler)
        .run()
        .await?;

    info!(
        samples = record.series.len(),
        best_position = record.best.position,
        best_value = record.best.scalar(),
        "sweep complete, table parked at best position"
    );
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

async fn build_devices(
    settings: &Settings,
    force_mock: bool,
) -> anyhow::Result<(Box<dyn Positioner + Sync>, Box<dyn Sampler>)> {
    let turntable_kind = if force_mock {
        DeviceKind::Mock
    } else {
        settings.turntable.kind
    };
    let analyzer_kind = if force_mock {
        DeviceKind::Mock
    } else {
        settings.analyzer.kind
    };

    // The mock pair is coupled so the mock analyzer sees the simulated
    // table position; mixing a mock analyzer with real hardware yields a
    // flat pattern instead.
    let mock_table = MockTurntable::new()
        .with_initial_position(settings.scan.start_position)
        .await;

    let positioner: Box<dyn Positioner + Sync> = match turntable_kind {
        DeviceKind::Mock => Box::new(mock_table.clone()),
        DeviceKind::Hardware => {
            #[cfg(feature = "hardware_serial")]
            {
                Box::new(
                    beamsteer::hardware::cud3::Cud3Turntable::connect(
                        &settings.turntable.port,
                        settings.turntable.baud_rate,
                    )
                    .await?,
                )
            }
            #[cfg(not(feature = "hardware_serial"))]
            {
                return Err(anyhow::anyhow!(
                    "serial support not enabled, rebuild with --features hardware_serial"
                ));
            }
        }
    };

    let sampler: Box<dyn Sampler> = match analyzer_kind {
        DeviceKind::Mock => Box::new(MockAnalyzer::beam_pattern(
            mock_table.probe(),
            MOCK_PEAK_DEGREES,
        )),
        DeviceKind::Hardware => Box::new(
            VnaAnalyzer::connect(
                &settings.analyzer.host,
                settings.analyzer.port,
                settings.analyzer.channel,
                &settings.analyzer.s_parameter,
            )
            .await?,
        ),
    };

    Ok((positioner, sampler))
}
