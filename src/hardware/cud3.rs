//! CUD III turntable controller driver.
//!
//! The control unit fronts an HRT-series turntable over a half-duplex
//! RS-485 serial link. Commands are short ASCII verbs terminated by CR and
//! answered with a single CR-terminated line.
//!
//! Command set used by this driver:
//!
//! - `CS?` connection state (`CS0` no cable, `CS1` table off, `CS2` on)
//! - `GP?` position readback (`PO{degrees}`)
//! - `PL?` / `PL0` display polarity query / force unipolar
//! - `SV{rpm}` velocity, `SA{code}` acceleration function
//! - `SS{deg}` step size, `SC` / `SCC` step clockwise / counter-clockwise
//! - `GC{deg}` / `GCC{deg}` go to angle clockwise / counter-clockwise
//! - `MV?` moving flag (`MV0` / `MV1`), `AB` abort motion
//!
//! # Example Usage
//!
//! ```no_run
//! use beamsteer::core::{Direction, Positioner};
//! use beamsteer::hardware::cud3::Cud3Turntable;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut table = Cud3Turntable::connect("/dev/ttyUSB0", 9600).await?;
//!     table.move_absolute(45.0, Direction::Clockwise).await?;
//!     table.wait_idle(std::time::Duration::from_secs(60)).await?;
//!     println!("Position: {:.1} deg", table.position().await?);
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

use crate::core::{AccelerationProfile, Direction, MotionProfile, Positioner};

const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Wire codes for the controller's built-in acceleration functions.
fn acceleration_code(profile: AccelerationProfile) -> u8 {
    match profile {
        AccelerationProfile::Impulse => 0,
        AccelerationProfile::Steep => 5,
        AccelerationProfile::Medium => 6,
        AccelerationProfile::Flat => 7,
    }
}

/// Driver for a turntable behind a CUD III control unit.
pub struct Cud3Turntable {
    /// Serial port protected by a mutex for exclusive access per transaction.
    port: Mutex<SerialStream>,
}

impl Cud3Turntable {
    /// Open the serial link and verify the controller is connected and on.
    pub async fn connect(port_path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(port_path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| format!("failed to open CUD III serial port {port_path}"))?;

        let table = Self {
            port: Mutex::new(port),
        };

        match table.transaction("CS?").await?.as_str() {
            "CS0" => bail!("no CUD III cable is connected"),
            "CS1" => bail!("the turntable is switched off or not connected to CUD III"),
            "CS2" => info!(port = port_path, "turntable connected"),
            other => bail!("unexpected connection state response: {other}"),
        }
        table.normalize_polarity().await;

        Ok(table)
    }

    /// Force unipolar position display so readbacks cover 0..360 degrees.
    /// Some controller revisions refuse the switch; positions above 180
    /// degrees are unreliable on those.
    async fn normalize_polarity(&self) {
        match self.transaction("PL?").await {
            Ok(state) if state == "PL1" => {
                if self.command("PL0").await.is_err() {
                    warn!("unable to set unipolar display polarity, positions above 180 degrees are unreliable");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "polarity query failed"),
        }
    }

    /// One half-duplex request/response exchange.
    async fn transaction(&self, command: &str) -> Result<String> {
        let mut port = self.port.lock().await;

        let payload = format!("{command}\r");
        port.write_all(payload.as_bytes())
            .await
            .context("CUD III write failed")?;

        // Responses may arrive in chunks on the shared RS-485 bus.
        let mut response = Vec::with_capacity(32);
        let mut buf = [0u8; 32];
        let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, port.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.contains(&b'\r') {
                        break;
                    }
                }
                Ok(Err(err)) => return Err(err).context("CUD III read failed"),
                Err(_) => break,
            }
        }

        if response.is_empty() {
            bail!("no response to '{command}' within {RESPONSE_TIMEOUT:?}");
        }
        Ok(String::from_utf8_lossy(&response).trim().to_string())
    }

    /// Send a command that only acknowledges.
    async fn command(&self, command: &str) -> Result<()> {
        let response = self.transaction(command).await?;
        if response != "OK" {
            bail!("controller rejected '{command}': {response}");
        }
        Ok(())
    }
}

#[async_trait]
impl Positioner for Cud3Turntable {
    async fn position(&self) -> Result<f64> {
        let response = self.transaction("GP?").await?;
        let degrees = response
            .strip_prefix("PO")
            .ok_or_else(|| anyhow!("malformed position response: {response}"))?;
        degrees
            .trim()
            .parse::<f64>()
            .with_context(|| format!("failed to parse position readback '{response}'"))
    }

    async fn move_relative(&mut self, degrees: f64, direction: Direction) -> Result<()> {
        self.command(&format!("SS{degrees:.1}")).await?;
        match direction {
            Direction::Clockwise => self.command("SC").await,
            Direction::CounterClockwise => self.command("SCC").await,
        }
    }

    async fn move_absolute(&mut self, degrees: f64, direction: Direction) -> Result<()> {
        match direction {
            Direction::Clockwise => self.command(&format!("GC{degrees:.1}")).await,
            Direction::CounterClockwise => self.command(&format!("GCC{degrees:.1}")).await,
        }
    }

    async fn is_moving(&self) -> Result<bool> {
        match self.transaction("MV?").await?.as_str() {
            "MV0" => Ok(false),
            "MV1" => Ok(true),
            other => Err(anyhow!("unexpected moving-flag response: {other}")),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        // Abort is acknowledged whether or not the table was moving.
        self.command("AB").await
    }

    async fn configure(&mut self, motion: &MotionProfile) -> Result<()> {
        self.command(&format!("SV{:.0}", motion.velocity_rpm))
            .await
            .context("failed to set velocity")?;
        self.command(&format!("SA{}", acceleration_code(motion.acceleration)))
            .await
            .context("failed to set acceleration function")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceleration_wire_codes() {
        assert_eq!(acceleration_code(AccelerationProfile::Impulse), 0);
        assert_eq!(acceleration_code(AccelerationProfile::Steep), 5);
        assert_eq!(acceleration_code(AccelerationProfile::Medium), 6);
        assert_eq!(acceleration_code(AccelerationProfile::Flat), 7);
    }
}
