//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use rtusim_common::ConfigError;
use thiserror::Error;

use crate::point::PointKind;

pub type Result<T> = std::result::Result<T, RtuError>;

/// Query that failed to match anything, carried by [`RtuError::NotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupQuery {
    Key {
        kind: PointKind,
        device_type: String,
        number: u32,
        bit_id: Option<u32>,
    },
    Index {
        kind: PointKind,
        index: u32,
    },
    Control {
        index: u32,
    },
}

impl fmt::Display for LookupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupQuery::Key {
                kind,
                device_type,
                number,
                bit_id: Some(bit_id),
            } => write!(f, "{kind} point {device_type} {number} bit {bit_id}"),
            LookupQuery::Key {
                kind,
                device_type,
                number,
                bit_id: None,
            } => write!(f, "{kind} point {device_type} {number}"),
            LookupQuery::Index { kind, index } => write!(f, "{kind} point index {index}"),
            LookupQuery::Control { index } => write!(f, "control index {index}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RtuError {
    #[error("no match for {query}")]
    NotFound { query: LookupQuery },
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration rejected: {0}")]
    ConfigParse(#[from] ConfigError),
}

impl RtuError {
    pub(crate) fn not_found(query: LookupQuery) -> Self {
        RtuError::NotFound { query }
    }

    pub(crate) fn bad_request(reason: impl Into<String>) -> Self {
        RtuError::BadRequest(reason.into())
    }
}
