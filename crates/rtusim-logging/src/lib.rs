//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Instance-attributed logging adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Logging helpers shared by the simulated RTU port.
//!
//! Every log line emitted on behalf of a port instance carries the
//! [`InstanceContext`] it was produced for, so a host running several
//! ports can route output without any global identity.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::Level;

#[macro_use]
pub mod macros;

/// Identity of a single port instance, used only for log and publish attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceContext {
    /// Numeric identifier handed out by the host when the port is created.
    pub instance_id: u64,
    /// Port name as written in the host configuration.
    pub name: String,
}

impl InstanceContext {
    /// Create a context for the given host identifier and port name.
    pub fn new(instance_id: u64, name: impl Into<String>) -> Self {
        Self {
            instance_id,
            name: name.into(),
        }
    }

    /// Context used before the host has called `init`.
    pub fn unassigned() -> Self {
        Self::new(0, "unassigned")
    }
}

impl Default for InstanceContext {
    fn default() -> Self {
        Self::unassigned()
    }
}

/// Errors raised when decoding host log levels.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LogLevelError {
    /// The numeric level is outside `0..=5`.
    #[error("unknown host log level {0}")]
    Unknown(u8),
}

/// Log levels understood by the gateway host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum HostLogLevel {
    /// Finest grained diagnostics.
    Trace = 0,
    /// Developer diagnostics.
    Debug = 1,
    /// Normal operational messages.
    Info = 2,
    /// Recoverable anomalies.
    Warn = 3,
    /// Failed operations.
    Error = 4,
    /// Failures the operator must act on.
    Critical = 5,
}

impl HostLogLevel {
    /// Numeric code used on the host interface.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Closest `tracing` level. `Critical` has no direct counterpart and maps to `ERROR`.
    pub fn as_tracing_level(self) -> Level {
        match self {
            HostLogLevel::Trace => Level::TRACE,
            HostLogLevel::Debug => Level::DEBUG,
            HostLogLevel::Info => Level::INFO,
            HostLogLevel::Warn => Level::WARN,
            HostLogLevel::Error | HostLogLevel::Critical => Level::ERROR,
        }
    }
}

impl TryFrom<u8> for HostLogLevel {
    type Error = LogLevelError;

    fn try_from(value: u8) -> Result<Self, LogLevelError> {
        match value {
            0 => Ok(HostLogLevel::Trace),
            1 => Ok(HostLogLevel::Debug),
            2 => Ok(HostLogLevel::Info),
            3 => Ok(HostLogLevel::Warn),
            4 => Ok(HostLogLevel::Error),
            5 => Ok(HostLogLevel::Critical),
            other => Err(LogLevelError::Unknown(other)),
        }
    }
}

/// Emit a message on behalf of a port instance at a host log level.
pub fn log_host_message(ctx: &InstanceContext, level: HostLogLevel, message: &str) {
    match level {
        HostLogLevel::Trace => rtu_trace!(context = ctx, "{}", message),
        HostLogLevel::Debug => rtu_debug!(context = ctx, "{}", message),
        HostLogLevel::Info => rtu_info!(context = ctx, "{}", message),
        HostLogLevel::Warn => rtu_warn!(context = ctx, "{}", message),
        HostLogLevel::Error => rtu_error!(context = ctx, "{}", message),
        HostLogLevel::Critical => rtu_critical!(context = ctx, "{}", message),
    }
}
