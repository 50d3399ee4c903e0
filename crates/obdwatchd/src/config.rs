//! Daemon configuration file
//!
//! One TOML file holds everything. Missing sections and fields take their
//! defaults, and a missing file is the same as an empty one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use obdwatch_core::mac;
use obdwatch_obd::{ConnectionConfig, LinkConfig, PollConfig, PollError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sinks::SinkConfig;

/// Config file used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/obdwatch/config.toml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<PollError> for ConfigError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::InvalidConfig(msg) => ConfigError::Invalid(msg),
            other => ConfigError::Invalid(other.to_string()),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Default log level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bluetooth MAC of the adapter, normalized to `AA:BB:CC:DD:EE:FF`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_mac: Option<String>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            adapter_mac: None,
            poll: PollConfig::default(),
            connection: ConnectionConfig::default(),
            link: LinkConfig::default(),
            sink: SinkConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

/// Identity of the monitoring device, attached to every report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub device_type: Option<String>,
    /// Extra `device.<key>` tags; these override detected host values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

impl DaemonConfig {
    /// Load and validate `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section, normalizing the adapter MAC in place
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let level = self.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level '{}' is not one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        self.log_level = level;

        if let Some(raw) = &self.adapter_mac {
            let formatted = mac::format_mac_address(raw)
                .map_err(|e| ConfigError::Invalid(format!("adapter_mac: {}", e)))?;
            self.adapter_mac = Some(formatted);
        }

        self.poll.validate()?;
        self.connection.validate()?;
        self.link.validate()?;
        Ok(())
    }

    /// Tracing filter directive for the workspace crates
    pub fn log_filter(&self) -> String {
        ["obdwatchd", "obdwatch_obd", "obdwatch_core"]
            .iter()
            .map(|target| format!("{}={}", target, self.log_level))
            .collect::<Vec<_>>()
            .join(",")
    }
}
