//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the RTU simulator."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the RTU simulator workspace.
//! This crate exposes the point configuration snapshot consumed by the
//! simulation engine, the daemon configuration and the tracing bootstrap.

pub mod config;
pub mod logging;

pub use config::{
    AnalogConfig, BinaryConfig, ConfigError, ControlConfig, DaemonConfig, LoggingConfig,
    PortConfig, SimConfig, DEFAULT_TAP_MAX, DEFAULT_TAP_MIN, TAP_CHANGER_TYPE,
};
pub use logging::{init_tracing, LogFormat};
