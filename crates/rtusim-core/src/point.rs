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
use std::str::FromStr;

use serde::{Serialize, Serializer};
use strum::{Display, EnumString};

use crate::errors::RtuError;

/// Category of an addressable point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
pub enum PointKind {
    Binary,
    Analog,
}

bitflags::bitflags! {
    /// Quality annotations carried with every point value, named as on the host interface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QualityFlags: u16 {
        const ONLINE = 1 << 0;
        const RESTART = 1 << 1;
        const COMM_LOST = 1 << 2;
        const REMOTE_FORCED = 1 << 3;
        const LOCAL_FORCED = 1 << 4;
        const OVERRANGE = 1 << 5;
        const REFERENCE_ERR = 1 << 6;
        const ROLLOVER = 1 << 7;
        const DISCONTINUITY = 1 << 8;
        const CHATTER_FILTER = 1 << 9;
    }
}

impl Default for QualityFlags {
    fn default() -> Self {
        QualityFlags::ONLINE
    }
}

/// Host form: every flag name wrapped in pipes, e.g. `|ONLINE|COMM_LOST|`.
impl fmt::Display for QualityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("|")?;
        if self.is_empty() {
            return f.write_str("|");
        }
        for (name, _) in self.iter_names() {
            write!(f, "{name}|")?;
        }
        Ok(())
    }
}

impl FromStr for QualityFlags {
    type Err = RtuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = QualityFlags::empty();
        for name in s.split('|').map(str::trim).filter(|name| !name.is_empty()) {
            // older host builds spell it without the trailing D
            let name = if name == "LOCAL_FORCE" { "LOCAL_FORCED" } else { name };
            let flag = QualityFlags::from_name(name)
                .ok_or_else(|| RtuError::bad_request(format!("unknown quality flag {name:?}")))?;
            flags |= flag;
        }
        Ok(flags)
    }
}

impl Serialize for QualityFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Current value of a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    /// Single bit, always 0 or 1.
    Binary(u8),
    Analog(f64),
}

impl PointValue {
    pub fn kind(&self) -> PointKind {
        match self {
            PointValue::Binary(_) => PointKind::Binary,
            PointValue::Analog(_) => PointKind::Analog,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            PointValue::Binary(bit) => f64::from(*bit),
            PointValue::Analog(value) => *value,
        }
    }

    pub fn as_bit(&self) -> Option<u8> {
        match self {
            PointValue::Binary(bit) => Some(*bit),
            PointValue::Analog(_) => None,
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Binary(bit) => write!(f, "{bit}"),
            PointValue::Analog(value) => f.write_str(&format_analog(*value)),
        }
    }
}

/// The value as an integer when it has no fractional part and fits exactly.
pub fn integral_analog(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15).then_some(value as i64)
}

/// Render an analog value, dropping the fractional part when it is zero.
pub fn format_analog(value: f64) -> String {
    match integral_analog(value) {
        Some(whole) => whole.to_string(),
        None => value.to_string(),
    }
}

/// One addressable value of the simulated RTU.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub kind: PointKind,
    pub index: u32,
    pub device_type: String,
    pub number: u32,
    /// Position within a multi-bit device; always `None` for analogs.
    pub bit_id: Option<u32>,
    pub value: PointValue,
    pub quality: QualityFlags,
}

impl Point {
    pub fn binary(index: u32, device_type: &str, number: u32, bit_id: u32, value: u8) -> Self {
        Self {
            kind: PointKind::Binary,
            index,
            device_type: device_type.to_owned(),
            number,
            bit_id: Some(bit_id),
            value: PointValue::Binary(value),
            quality: QualityFlags::ONLINE,
        }
    }

    pub fn analog(index: u32, device_type: &str, number: u32, value: f64) -> Self {
        Self {
            kind: PointKind::Analog,
            index,
            device_type: device_type.to_owned(),
            number,
            bit_id: None,
            value: PointValue::Analog(value),
            quality: QualityFlags::ONLINE,
        }
    }

    /// Notification describing the point's current state.
    pub fn to_change(&self) -> PointChange {
        PointChange {
            kind: self.kind,
            index: self.index,
            quality: self.quality,
            value: self.value.to_string(),
        }
    }
}

/// Payload handed to the host's publish interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointChange {
    pub kind: PointKind,
    pub index: u32,
    pub quality: QualityFlags,
    pub value: String,
}
