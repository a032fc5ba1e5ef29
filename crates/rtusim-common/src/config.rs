//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the RTU simulator."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rtusim_logging::HostLogLevel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::logging::LogFormat;

/// Analog `Type` of a tap changer; its `Min`/`Max` bound the tap position.
pub const TAP_CHANGER_TYPE: &str = "TapChanger";
/// Lowest tap position when the analog point carries no `Min`.
pub const DEFAULT_TAP_MIN: f64 = 0.0;
/// Highest tap position when the analog point carries no `Max` (8-bit position).
pub const DEFAULT_TAP_MAX: f64 = 255.0;

/// Errors raised while building a [`SimConfig`] snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{document} configuration is not valid JSON: {source}")]
    Json {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} configuration must be a JSON object")]
    NotAnObject(&'static str),
    #[error("merged configuration has an invalid shape: {0}")]
    Shape(#[source] serde_json::Error),
    #[error("duplicate {kind} index {index}")]
    DuplicateIndex { kind: &'static str, index: u32 },
    #[error("duplicate binary point {device_type} {number} bit {bit_id}")]
    DuplicateBinary {
        device_type: String,
        number: u32,
        bit_id: u32,
    },
    #[error("binary point index {index} has value {value}, expected 0 or 1")]
    InvalidBinaryValue { index: u32, value: u8 },
    #[error("analog point index {index} has Min {min} above Max {max}")]
    InvalidRange { index: u32, min: f64, max: f64 },
    #[error("tap changer index {index} has {bound} {value}, expected a whole number")]
    FractionalLimit {
        index: u32,
        bound: &'static str,
        value: f64,
    },
}

/// Analog point definition. Tap changers use the optional `Min`/`Max` limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalogConfig {
    pub index: u32,
    #[serde(rename = "Type")]
    pub device_type: String,
    pub number: u32,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Binary point definition; one bit of a (possibly multi-bit) device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BinaryConfig {
    pub index: u32,
    #[serde(rename = "Type")]
    pub device_type: String,
    pub number: u32,
    #[serde(rename = "BitID")]
    pub bit_id: u32,
    #[serde(default)]
    pub value: u8,
}

/// Maps an inbound control index onto a device command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlConfig {
    pub index: u32,
    #[serde(rename = "Type")]
    pub device_type: String,
    pub number: u32,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Immutable point configuration snapshot built from the main and override documents.
///
/// The override replaces whole top-level keys of the main document; nested
/// values are never merged. Keys the engine does not know about (for example
/// the host's `ModuleName`) are kept in [`SimConfig::document`] untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimConfig {
    #[serde(rename = "Analogs", default)]
    pub analogs: Vec<AnalogConfig>,
    #[serde(rename = "Binaries", default)]
    pub binaries: Vec<BinaryConfig>,
    #[serde(rename = "BinaryControls", default)]
    pub binary_controls: Vec<ControlConfig>,
    #[serde(skip)]
    document: Map<String, Value>,
}

impl SimConfig {
    /// Build a snapshot from the two host documents. Empty strings count as absent.
    pub fn from_documents(main: &str, override_doc: &str) -> Result<Self, ConfigError> {
        Self::merge(None, main, override_doc)
    }

    /// Build a new snapshot, starting from `previous` when the main document is empty.
    ///
    /// Nothing is returned unless both documents parse, merge and validate.
    pub fn merge(
        previous: Option<&SimConfig>,
        main: &str,
        override_doc: &str,
    ) -> Result<Self, ConfigError> {
        let mut document = match parse_document("main", main)? {
            Some(document) => document,
            None => previous.map(|p| p.document.clone()).unwrap_or_default(),
        };
        if let Some(overrides) = parse_document("override", override_doc)? {
            for (key, value) in overrides {
                document.insert(key, value);
            }
        }

        let mut config: SimConfig =
            serde_json::from_value(Value::Object(document.clone())).map_err(ConfigError::Shape)?;
        config.document = document;
        config.validate()?;
        debug!(
            analogs = config.analogs.len(),
            binaries = config.binaries.len(),
            controls = config.binary_controls.len(),
            "point configuration merged"
        );
        Ok(config)
    }

    /// The merged JSON document, including keys the engine ignores.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Compact JSON rendering of the merged document.
    pub fn merged_json(&self) -> String {
        Value::Object(self.document.clone()).to_string()
    }

    /// Validate structural invariants of the point tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut analog_indices = HashSet::new();
        for analog in &self.analogs {
            if !analog_indices.insert(analog.index) {
                return Err(ConfigError::DuplicateIndex {
                    kind: "analog",
                    index: analog.index,
                });
            }
            if analog.device_type == TAP_CHANGER_TYPE {
                validate_tap_limits(analog)?;
            } else if let (Some(min), Some(max)) = (analog.min, analog.max) {
                if min > max {
                    return Err(ConfigError::InvalidRange {
                        index: analog.index,
                        min,
                        max,
                    });
                }
            }
        }

        let mut binary_indices = HashSet::new();
        let mut binary_keys = HashSet::new();
        for binary in &self.binaries {
            if !binary_indices.insert(binary.index) {
                return Err(ConfigError::DuplicateIndex {
                    kind: "binary",
                    index: binary.index,
                });
            }
            if !binary_keys.insert((binary.device_type.as_str(), binary.number, binary.bit_id)) {
                return Err(ConfigError::DuplicateBinary {
                    device_type: binary.device_type.clone(),
                    number: binary.number,
                    bit_id: binary.bit_id,
                });
            }
            if binary.value > 1 {
                return Err(ConfigError::InvalidBinaryValue {
                    index: binary.index,
                    value: binary.value,
                });
            }
        }

        let mut control_indices = HashSet::new();
        for control in &self.binary_controls {
            if !control_indices.insert(control.index) {
                return Err(ConfigError::DuplicateIndex {
                    kind: "control",
                    index: control.index,
                });
            }
        }
        Ok(())
    }
}

/// Tap limits are whole positions and the effective range, with missing
/// bounds defaulted, must not be empty.
fn validate_tap_limits(analog: &AnalogConfig) -> Result<(), ConfigError> {
    for (bound, value) in [("Min", analog.min), ("Max", analog.max)] {
        if let Some(value) = value {
            if !value.is_finite() || value.fract() != 0.0 {
                return Err(ConfigError::FractionalLimit {
                    index: analog.index,
                    bound,
                    value,
                });
            }
        }
    }
    let min = analog.min.unwrap_or(DEFAULT_TAP_MIN);
    let max = analog.max.unwrap_or(DEFAULT_TAP_MAX);
    if min > max {
        return Err(ConfigError::InvalidRange {
            index: analog.index,
            min,
            max,
        });
    }
    Ok(())
}

fn parse_document(
    document: &'static str,
    text: &str,
) -> Result<Option<Map<String, Value>>, ConfigError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|source| ConfigError::Json { document, source })?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(ConfigError::NotAnObject(document)),
    }
}

fn default_port_name() -> String {
    "RTU1".to_owned()
}

fn default_instance_id() -> u64 {
    1
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Configuration for the `rtusimd` harness, read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub port: PortConfig,
}

/// Metadata describing where a [`DaemonConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedDaemonConfig {
    pub config: DaemonConfig,
    pub source: Option<PathBuf>,
}

impl DaemonConfig {
    pub const ENV_CONFIG_PATH: &str = "RTUSIM_CONFIG";

    /// Load configuration from disk, respecting the `RTUSIM_CONFIG` override.
    ///
    /// Falls back to [`DaemonConfig::default`] when none of the candidates exist.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedDaemonConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedDaemonConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedDaemonConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        Ok(LoadedDaemonConfig {
            config: DaemonConfig::default(),
            source: None,
        })
    }

    /// Read and validate a TOML configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading daemon configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<DaemonConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.name.trim().is_empty() {
            return Err(anyhow!("port name cannot be empty"));
        }
        Ok(())
    }
}

impl std::str::FromStr for DaemonConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: DaemonConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON log file; no file is written when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Host log level used when neither `RTUSIM_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub level: Option<HostLogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
            level: None,
        }
    }
}

/// Identity of the simulated port and the point documents it is configured from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_port_name")]
    pub name: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: u64,
    #[serde(default)]
    pub main_config: Option<PathBuf>,
    #[serde(default)]
    pub override_config: Option<PathBuf>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: default_port_name(),
            instance_id: default_instance_id(),
            main_config: None,
            override_config: None,
        }
    }
}

impl PortConfig {
    /// Read the main and override documents. Missing paths yield empty documents.
    pub fn read_documents(&self) -> Result<(String, String)> {
        let main = read_optional(self.main_config.as_deref())?;
        let override_doc = read_optional(self.override_config.as_deref())?;
        Ok((main, override_doc))
    }
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("unable to read point configuration {}", path.display())),
        None => Ok(String::new()),
    }
}
