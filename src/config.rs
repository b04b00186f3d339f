//! Configuration system using Figment.
//!
//! Settings are loaded in three layers, later layers overriding earlier
//! ones:
//!
//! 1. built-in defaults
//! 2. a TOML file (`config/default.toml` unless overridden on the CLI)
//! 3. environment variables prefixed with `BEAMSTEER_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys use a double underscore:
//!
//! ```text
//! BEAMSTEER_APPLICATION__LOG_LEVEL=debug
//! BEAMSTEER_SCAN__INCREMENT=5.0
//! BEAMSTEER_TURNTABLE__PORT=/dev/ttyUSB1
//! ```

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScanError;
use crate::scan::ScanConfig;

/// Default configuration file consulted when the CLI names none.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Which backing implementation to construct for a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Real vendor driver.
    Hardware,
    /// Deterministic in-process fake.
    Mock,
}

/// Application-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Display name used in logs.
    pub name: String,
    /// Default logging directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "beamsteer".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Turntable connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurntableSettings {
    /// Backing implementation.
    pub kind: DeviceKind,
    /// Serial port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Serial baud rate.
    pub baud_rate: u32,
}

impl Default for TurntableSettings {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        }
    }
}

/// Network analyzer connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// Backing implementation.
    pub kind: DeviceKind,
    /// Instrument hostname or IP address.
    pub host: String,
    /// SCPI socket port.
    pub port: u16,
    /// Measurement channel number.
    pub channel: u32,
    /// S-parameter to trace, e.g. `"S21"`.
    pub s_parameter: String,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            host: "192.168.0.1".to_string(),
            port: 5025,
            channel: 1,
            s_parameter: "S21".to_string(),
        }
    }
}

/// Top-level application settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application-level settings.
    pub application: ApplicationSettings,
    /// Sweep parameters.
    pub scan: ScanConfig,
    /// Turntable connection settings.
    pub turntable: TurntableSettings,
    /// Analyzer connection settings.
    pub analyzer: AnalyzerSettings,
}

impl Settings {
    /// Load and validate settings from defaults, file, and environment.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ScanError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BEAMSTEER_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), ScanError> {
        self.scan.validate()?;
        if self.turntable.kind == DeviceKind::Hardware && self.turntable.port.is_empty() {
            return Err(ScanError::Configuration(
                "turntable serial port must not be empty".to_string(),
            ));
        }
        if self.analyzer.kind == DeviceKind::Hardware && self.analyzer.host.is_empty() {
            return Err(ScanError::Configuration(
                "analyzer host must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        Settings::default().validate().expect("defaults must pass");
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let settings =
            Settings::load(Some(Path::new("/nonexistent/beamsteer.toml"))).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_overrides_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            r#"
[scan]
start_position = 90.0
end_position = 180.0
increment = 5.0

[turntable]
port = "/dev/ttyUSB7"
"#
        )
        .expect("write");

        let settings = Settings::load(Some(file.path())).expect("load");
        assert_eq!(settings.scan.start_position, 90.0);
        assert_eq!(settings.scan.end_position, 180.0);
        assert_eq!(settings.scan.increment, 5.0);
        assert_eq!(settings.turntable.port, "/dev/ttyUSB7");
        // Untouched sections keep their defaults.
        assert_eq!(settings.analyzer, AnalyzerSettings::default());
    }

    #[test]
    fn test_load_rejects_invalid_sweep() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            r#"
[scan]
increment = -1.0
"#
        )
        .expect("write");

        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(ScanError::Configuration(_))
        ));
    }
}
