//! Persisted configuration: timing integration, pool and display settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::state::{DisplaySettings, PoolConfig};

pub const DEFAULT_COM_SETTINGS: &str = "9600,7,n,1";

/// Timing-system integration settings.
///
/// Not scoreboard-visible state: mutating this is the sole trigger for a
/// listener restart and never causes a snapshot broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Directory holding the meet-management export files.
    #[serde(default)]
    pub lst_path: PathBuf,
    /// Serial device of the timing controller, e.g. `/dev/ttyUSB0`.
    #[serde(default)]
    pub com_port: String,
    /// `baud,data bits,parity,stop bits`, e.g. `9600,7,n,1`.
    #[serde(default = "default_com_settings")]
    pub com_settings: String,
    #[serde(default)]
    pub debug_capture_enabled: bool,
    /// JSONL sink for raw-frame capture.
    #[serde(default)]
    pub debug_path: Option<PathBuf>,
    /// Seconds to keep final results on the board before the next heat's
    /// messages are processed.
    #[serde(default)]
    pub hold_results_time: f64,
    /// Override for the serial-bridge binary; defaults to
    /// `swimboard-listener` next to the server executable.
    #[serde(default)]
    pub listener_program: Option<PathBuf>,
}

fn default_com_settings() -> String {
    DEFAULT_COM_SETTINGS.to_string()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lst_path: PathBuf::new(),
            com_port: String::new(),
            com_settings: default_com_settings(),
            debug_capture_enabled: false,
            debug_path: None,
            hold_results_time: 0.0,
            listener_program: None,
        }
    }
}

/// Parsed form of the `com_settings` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: char,
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 7,
            parity: 'N',
            stop_bits: 1,
        }
    }
}

impl FromStr for SerialSettings {
    type Err = anyhow::Error;

    /// Parse `baud[,data bits[,parity[,stop bits]]]`; omitted parts keep
    /// their defaults, present-but-garbage parts are an error.
    fn from_str(value: &str) -> Result<Self> {
        let mut settings = SerialSettings::default();
        let parts: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if let Some(baud) = parts.first() {
            settings.baud_rate = baud
                .parse()
                .with_context(|| format!("invalid baud rate {baud:?}"))?;
        }
        if let Some(bits) = parts.get(1) {
            settings.data_bits = bits
                .parse()
                .with_context(|| format!("invalid data bits {bits:?}"))?;
            anyhow::ensure!(
                (5..=8).contains(&settings.data_bits),
                "data bits must be 5-8, got {}",
                settings.data_bits
            );
        }
        if let Some(parity) = parts.get(2) {
            let parity = parity.to_ascii_uppercase();
            anyhow::ensure!(
                matches!(parity.as_str(), "N" | "E" | "O" | "M" | "S"),
                "invalid parity {parity:?}"
            );
            settings.parity = parity.chars().next().unwrap_or('N');
        }
        if let Some(stop) = parts.get(3) {
            settings.stop_bits = stop
                .parse()
                .with_context(|| format!("invalid stop bits {stop:?}"))?;
            anyhow::ensure!(
                matches!(settings.stop_bits, 1 | 2),
                "stop bits must be 1 or 2, got {}",
                settings.stop_bits
            );
        }
        Ok(settings)
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.baud_rate,
            self.data_bits,
            self.parity.to_ascii_lowercase(),
            self.stop_bits
        )
    }
}

/// Everything the server persists across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Path this configuration was loaded from.
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub scoreboard: DisplaySettings,
}

impl ServerConfig {
    /// Load configuration from `path` (or the platform default), creating a
    /// default file when none exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_config_path);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let mut config: ServerConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            Ok(config)
        } else {
            let config = ServerConfig {
                config_path,
                ..ServerConfig::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Persist the configuration to its file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;
        Ok(())
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("swimboard")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_settings_round_trip() {
        let settings: SerialSettings = "9600,7,n,1".parse().unwrap();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, 7);
        assert_eq!(settings.parity, 'N');
        assert_eq!(settings.stop_bits, 1);
        assert_eq!(settings.to_string(), "9600,7,n,1");
    }

    #[test]
    fn serial_settings_partial_and_invalid() {
        let settings: SerialSettings = "19200".parse().unwrap();
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.data_bits, 7);

        let defaults: SerialSettings = "".parse().unwrap();
        assert_eq!(defaults, SerialSettings::default());

        assert!("fast".parse::<SerialSettings>().is_err());
        assert!("9600,9".parse::<SerialSettings>().is_err());
        assert!("9600,8,q".parse::<SerialSettings>().is_err());
        assert!("9600,8,n,3".parse::<SerialSettings>().is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ServerConfig::load(Some(path.clone())).unwrap();
        assert!(path.exists());
        assert_eq!(config.pool.lane_count, 8);

        config.timing.com_port = "/dev/ttyUSB0".to_string();
        config.timing.hold_results_time = 12.5;
        config.pool.lane_count = 6;
        config.scoreboard.font_scale = 150;
        config.save().unwrap();

        let reloaded = ServerConfig::load(Some(path)).unwrap();
        assert_eq!(reloaded.timing.com_port, "/dev/ttyUSB0");
        assert_eq!(reloaded.timing.hold_results_time, 12.5);
        assert_eq!(reloaded.pool.lane_count, 6);
        assert_eq!(reloaded.scoreboard.font_scale, 150);
        assert_eq!(reloaded.timing.com_settings, DEFAULT_COM_SETTINGS);
    }
}
