//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Transport-independent status reads and set writes.

use std::str::FromStr;

use rtusim_logging::{rtu_debug, InstanceContext};
use serde::{Deserialize, Serialize, Serializer};

use crate::control::{CbState, ControlMapper, DeviceType};
use crate::errors::{Result, RtuError};
use crate::point::{format_analog, integral_analog};
use crate::store::PointStore;

/// Response body of a status read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceStatus {
    CircuitBreaker {
        #[serde(rename = "Bit0")]
        bit0: u8,
        #[serde(rename = "Bit1")]
        bit1: u8,
        #[serde(rename = "State")]
        state: CbState,
    },
    TapChanger {
        #[serde(rename = "State", serialize_with = "serialize_position")]
        state: f64,
    },
}

fn serialize_position<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match integral_analog(*value) {
        Some(whole) => serializer.serialize_i64(whole),
        None => serializer.serialize_f64(*value),
    }
}

/// Number field that may arrive as JSON number or as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Number(f64),
    Text(String),
}

impl NumericField {
    pub fn to_f64(&self, field: &str) -> Result<f64> {
        match self {
            NumericField::Number(value) => Ok(*value),
            NumericField::Text(text) => f64::from_str(text.trim()).map_err(|_| {
                RtuError::bad_request(format!("{field} {text:?} is not numeric"))
            }),
        }
    }

    /// Device numbers are non-negative integers.
    pub fn to_device_number(&self) -> Result<u32> {
        let value = self.to_f64("Number")?;
        if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
            return Err(RtuError::bad_request(format!(
                "Number {} is not a device number",
                format_analog(value)
            )));
        }
        Ok(value as u32)
    }
}

/// Body of a set request, e.g. `{"Type":"CB","Number":1,"State":"Open"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetRequest {
    #[serde(rename = "Type")]
    pub device_type: String,
    pub number: NumericField,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub value: Option<NumericField>,
}

impl SetRequest {
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|err| RtuError::bad_request(format!("set body not understood: {err}")))
    }
}

/// Response body of a successful set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetResponse {
    #[serde(rename = "Result")]
    pub result: &'static str,
}

impl SetResponse {
    pub const OK: SetResponse = SetResponse { result: "OK" };
}

fn device_type(name: &str) -> Result<DeviceType> {
    DeviceType::from_str(name)
        .map_err(|_| RtuError::bad_request(format!("unsupported device type {name:?}")))
}

/// Read the status of one device.
pub fn get_status(store: &PointStore, device_type_name: &str, number: u32) -> Result<DeviceStatus> {
    match device_type(device_type_name)? {
        DeviceType::CircuitBreaker => {
            let reading = ControlMapper::cb_reading(store, number)?;
            Ok(DeviceStatus::CircuitBreaker {
                bit0: reading.bit0,
                bit1: reading.bit1,
                state: reading.state,
            })
        }
        DeviceType::TapChanger => Ok(DeviceStatus::TapChanger {
            state: ControlMapper::tap_changer_value(store, number)?,
        }),
    }
}

/// Apply a set request through the control mapper.
pub fn set_status(
    store: &mut PointStore,
    mapper: &ControlMapper,
    ctx: &InstanceContext,
    request: &SetRequest,
) -> Result<SetResponse> {
    let number = request.number.to_device_number()?;
    match device_type(&request.device_type)? {
        DeviceType::CircuitBreaker => {
            let state = request
                .state
                .as_deref()
                .ok_or_else(|| RtuError::bad_request("CB set request needs a State"))?;
            mapper.cb_set_state(store, ctx, number, state)?;
        }
        DeviceType::TapChanger => {
            let value = request
                .value
                .as_ref()
                .ok_or_else(|| RtuError::bad_request("TapChanger set request needs a Value"))?
                .to_f64("Value")?;
            let applied = mapper.tap_changer_set_value(store, ctx, number, value)?;
            rtu_debug!(context = ctx, "tap changer {} now at {}", number, applied);
        }
    }
    Ok(SetResponse::OK)
}
