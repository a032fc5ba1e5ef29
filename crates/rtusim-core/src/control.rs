//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Translates device-level commands into point updates.
//!
//! A circuit breaker is two binary points (`BitID` 0 and 1) of the same
//! `CB` number. A tap changer is a single `TapChanger` analog point.

use std::collections::HashMap;
use std::str::FromStr;

use indexmap::IndexMap;
pub use rtusim_common::{DEFAULT_TAP_MAX, DEFAULT_TAP_MIN};
use rtusim_common::{ControlConfig, SimConfig};
use rtusim_logging::{rtu_debug, rtu_warn, InstanceContext};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::errors::{LookupQuery, Result, RtuError};
use crate::point::{PointKind, PointValue};
use crate::store::PointStore;

/// Device categories the mapper knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum DeviceType {
    #[strum(serialize = "CB")]
    CircuitBreaker,
    TapChanger,
}

impl DeviceType {
    /// The `Type` name used in configuration and requests.
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceType::CircuitBreaker => "CB",
            DeviceType::TapChanger => "TapChanger",
        }
    }
}

/// Commands accepted when setting a circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum CbCommand {
    MaintenanceZeros,
    Maintenance,
    Closed,
    Open,
    FaultOnes,
    Fault,
}

impl CbCommand {
    /// Target `(bit0, bit1)` values for the command.
    pub fn bits(self) -> (u8, u8) {
        match self {
            CbCommand::MaintenanceZeros | CbCommand::Maintenance => (0, 0),
            CbCommand::Closed => (1, 0),
            CbCommand::Open => (0, 1),
            CbCommand::FaultOnes | CbCommand::Fault => (1, 1),
        }
    }
}

/// Human-readable breaker state derived from its two bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum CbState {
    Maintenance,
    Closed,
    Open,
    Fault,
}

impl CbState {
    /// Readback table indexed `[bit1][bit0]`.
    pub fn from_bits(bit1: u8, bit0: u8) -> Self {
        const TABLE: [[CbState; 2]; 2] = [
            [CbState::Maintenance, CbState::Closed],
            [CbState::Open, CbState::Fault],
        ];
        TABLE[usize::from(bit1 != 0)][usize::from(bit0 != 0)]
    }
}

/// Allowed tap positions for one tap changer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for TapLimits {
    fn default() -> Self {
        Self {
            min: DEFAULT_TAP_MIN,
            max: DEFAULT_TAP_MAX,
        }
    }
}

impl TapLimits {
    /// Validate a requested tap position and clamp it into range.
    ///
    /// Returns the position to apply and whether clamping happened.
    pub fn clamp(&self, value: f64) -> Result<(f64, bool)> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(RtuError::bad_request(format!(
                "tap position must be a whole number, got {value}"
            )));
        }
        let clamped = value.max(self.min).min(self.max);
        Ok((clamped, clamped != value))
    }
}

/// Read-only control definition resolved from an inbound control index.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlDefinition {
    pub index: u32,
    pub device_type: String,
    pub number: u32,
    pub command: String,
    pub value: Option<f64>,
}

impl From<&ControlConfig> for ControlDefinition {
    fn from(config: &ControlConfig) -> Self {
        Self {
            index: config.index,
            device_type: config.device_type.clone(),
            number: config.number,
            command: config.command.clone(),
            value: config.value,
        }
    }
}

/// Current bits and combined state of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CbReading {
    pub bit0: u8,
    pub bit1: u8,
    pub state: CbState,
}

/// Encodes device commands as point store mutations.
#[derive(Debug, Default)]
pub struct ControlMapper {
    controls: IndexMap<u32, ControlDefinition>,
    tap_limits: HashMap<u32, TapLimits>,
}

impl ControlMapper {
    /// Build the control table and tap limits from a validated snapshot.
    pub fn from_config(config: &SimConfig) -> Self {
        let controls = config
            .binary_controls
            .iter()
            .map(|control| (control.index, ControlDefinition::from(control)))
            .collect();
        let tap_changer = DeviceType::TapChanger.as_str();
        let mut tap_limits = HashMap::new();
        for analog in config.analogs.iter().filter(|a| a.device_type == tap_changer) {
            let defaults = TapLimits::default();
            tap_limits.entry(analog.number).or_insert(TapLimits {
                min: analog.min.unwrap_or(defaults.min),
                max: analog.max.unwrap_or(defaults.max),
            });
        }
        Self {
            controls,
            tap_limits,
        }
    }

    pub fn resolve_control(&self, index: u32) -> Result<&ControlDefinition> {
        self.controls
            .get(&index)
            .ok_or_else(|| RtuError::not_found(LookupQuery::Control { index }))
    }

    pub fn controls(&self) -> impl Iterator<Item = &ControlDefinition> {
        self.controls.values()
    }

    /// Combined breaker state for the given bit values.
    pub fn cb_get_combined_state(bit1: u8, bit0: u8) -> CbState {
        CbState::from_bits(bit1, bit0)
    }

    /// Drive breaker `number` to the state named by `command`.
    ///
    /// Both bit points are resolved before either is written, so an unknown
    /// command or a missing bit leaves the store untouched. Bit0 is written
    /// before bit1; each write publishes only if it changed the bit.
    pub fn cb_set_state(
        &self,
        store: &mut PointStore,
        ctx: &InstanceContext,
        number: u32,
        command: &str,
    ) -> Result<()> {
        let command = CbCommand::from_str(command)
            .map_err(|_| RtuError::UnknownCommand(command.to_owned()))?;
        let breaker = DeviceType::CircuitBreaker.as_str();
        let bit0_index = store.lookup(PointKind::Binary, breaker, number, Some(0))?.index;
        let bit1_index = store.lookup(PointKind::Binary, breaker, number, Some(1))?.index;

        rtu_debug!(context = ctx, "setting CB {} state to {}", number, command);
        let (bit0, bit1) = command.bits();
        store.set_value(ctx, PointKind::Binary, bit0_index, PointValue::Binary(bit0))?;
        store.set_value(ctx, PointKind::Binary, bit1_index, PointValue::Binary(bit1))?;
        Ok(())
    }

    /// Read the two bits of breaker `number` and derive its state.
    pub fn cb_reading(store: &PointStore, number: u32) -> Result<CbReading> {
        let breaker = DeviceType::CircuitBreaker.as_str();
        let bit_value = |bit_id| -> Result<u8> {
            let point = store.lookup(PointKind::Binary, breaker, number, Some(bit_id))?;
            Ok(point.value.as_bit().unwrap_or_default())
        };
        let bit0 = bit_value(0)?;
        let bit1 = bit_value(1)?;
        Ok(CbReading {
            bit0,
            bit1,
            state: Self::cb_get_combined_state(bit1, bit0),
        })
    }

    pub fn tap_limits(&self, number: u32) -> TapLimits {
        self.tap_limits.get(&number).copied().unwrap_or_default()
    }

    /// Current position of tap changer `number`.
    pub fn tap_changer_value(store: &PointStore, number: u32) -> Result<f64> {
        let point = store.lookup(
            PointKind::Analog,
            DeviceType::TapChanger.as_str(),
            number,
            None,
        )?;
        Ok(point.value.as_f64())
    }

    /// Move tap changer `number` to `value`, clamped to its limits. Returns the applied position.
    pub fn tap_changer_set_value(
        &self,
        store: &mut PointStore,
        ctx: &InstanceContext,
        number: u32,
        value: f64,
    ) -> Result<f64> {
        let index = store
            .lookup(
                PointKind::Analog,
                DeviceType::TapChanger.as_str(),
                number,
                None,
            )?
            .index;
        let limits = self.tap_limits(number);
        let (applied, clamped) = limits.clamp(value)?;
        if clamped {
            rtu_warn!(
                context = ctx,
                "tap changer {} request {} outside {}..={}, clamped to {}",
                number,
                value,
                limits.min,
                limits.max,
                applied
            );
        }
        rtu_debug!(context = ctx, "setting tap changer {} value to {}", number, applied);
        store.set_value(ctx, PointKind::Analog, index, PointValue::Analog(applied))?;
        Ok(applied)
    }

    /// Step tap changer `number` by `delta` positions, clamped to its limits.
    pub fn tap_changer_step(
        &self,
        store: &mut PointStore,
        ctx: &InstanceContext,
        number: u32,
        delta: i32,
    ) -> Result<f64> {
        let current = Self::tap_changer_value(store, number)?;
        self.tap_changer_set_value(store, ctx, number, current.round() + f64::from(delta))
    }
}
