//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Routes inbound host events to the control mapper or to initial-state replay.

use std::str::FromStr;

use rtusim_logging::{rtu_debug, rtu_info, rtu_warn, InstanceContext};
use strum::{Display, EnumString};

use crate::control::{ControlMapper, DeviceType};
use crate::errors::{Result, RtuError};
use crate::point::QualityFlags;
use crate::store::PointStore;

/// Event type names delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
pub enum EventType {
    Binary,
    DoubleBitBinary,
    Analog,
    Counter,
    FrozenCounter,
    BinaryOutputStatus,
    AnalogOutputStatus,
    BinaryCommandEvent,
    AnalogCommandEvent,
    OctetString,
    TimeAndInterval,
    SecurityStat,
    ControlRelayOutputBlock,
    AnalogOutputInt16,
    AnalogOutputInt32,
    AnalogOutputFloat32,
    AnalogOutputDouble64,
    BinaryQuality,
    DoubleBitBinaryQuality,
    AnalogQuality,
    CounterQuality,
    BinaryOutputStatusQuality,
    FrozenCounterQuality,
    AnalogOutputStatusQuality,
    ConnectState,
    #[strum(default)]
    Other(String),
}

impl EventType {
    pub fn parse(name: &str) -> Self {
        // the default variant makes parsing infallible
        EventType::from_str(name).unwrap_or_else(|_| EventType::Other(name.to_owned()))
    }
}

/// Connectivity as reported by `ConnectState` payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
pub enum LinkState {
    #[default]
    #[strum(serialize = "UNKNOWN")]
    Unknown,
    #[strum(serialize = "PORT_UP")]
    PortUp,
    #[strum(serialize = "PORT_DOWN")]
    PortDown,
    #[strum(serialize = "CONNECTED")]
    Connected,
    #[strum(serialize = "DISCONNECTED")]
    Disconnected,
}

/// One event as handed over by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event_type: EventType,
    pub index: u32,
    /// Milliseconds since the epoch.
    pub time_ms: u64,
    /// Quality in the host's pipe-delimited form, as received.
    pub quality: String,
    pub payload: String,
    pub sender: String,
}

impl InboundEvent {
    pub fn new(event_type: &str, index: u32) -> Self {
        Self {
            event_type: EventType::parse(event_type),
            index,
            time_ms: 0,
            quality: "|ONLINE|".to_owned(),
            payload: String::new(),
            sender: String::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_time(mut self, time_ms: u64) -> Self {
        self.time_ms = time_ms;
        self
    }

    pub fn quality_flags(&self) -> Result<QualityFlags> {
        self.quality.parse()
    }
}

/// Connectivity state machine plus control routing.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    link: LinkState,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    /// Handle one event. Always reports the event as handled; failures are logged.
    pub fn handle(
        &mut self,
        ctx: &InstanceContext,
        event: &InboundEvent,
        store: &mut PointStore,
        mapper: &ControlMapper,
    ) -> bool {
        let quality = event.quality_flags().unwrap_or_else(|err| {
            rtu_warn!(context = ctx, "event index {} quality not understood: {}", event.index, err);
            QualityFlags::empty()
        });
        rtu_debug!(
            context = ctx,
            "event {:?} index {} quality {} payload {:?} from {:?} at {}",
            event.event_type,
            event.index,
            quality,
            event.payload,
            event.sender,
            event.time_ms
        );

        match &event.event_type {
            EventType::ControlRelayOutputBlock => {
                if let Err(err) = self.apply_control(ctx, event.index, store, mapper) {
                    rtu_warn!(context = ctx, "control index {} not applied: {}", event.index, err);
                }
            }
            EventType::ConnectState => self.connect_state(ctx, &event.payload, store),
            other => {
                rtu_debug!(context = ctx, "ignoring {:?} event", other);
            }
        }
        true
    }

    fn apply_control(
        &self,
        ctx: &InstanceContext,
        index: u32,
        store: &mut PointStore,
        mapper: &ControlMapper,
    ) -> Result<()> {
        let control = mapper.resolve_control(index)?;
        let Ok(device) = DeviceType::from_str(&control.device_type) else {
            rtu_debug!(
                context = ctx,
                "control for unsupported device type {} ignored - {}",
                control.device_type,
                control.command
            );
            return Ok(());
        };

        match (device, control.command.as_str()) {
            (DeviceType::CircuitBreaker, "Trip") => {
                mapper.cb_set_state(store, ctx, control.number, "Open")
            }
            (DeviceType::CircuitBreaker, "Close") => {
                mapper.cb_set_state(store, ctx, control.number, "Closed")
            }
            (DeviceType::TapChanger, "Raise") => mapper
                .tap_changer_step(store, ctx, control.number, 1)
                .map(|_| ()),
            (DeviceType::TapChanger, "Lower") => mapper
                .tap_changer_step(store, ctx, control.number, -1)
                .map(|_| ()),
            (DeviceType::TapChanger, "Set") => {
                let value = control.value.ok_or_else(|| {
                    RtuError::BadRequest(format!("control index {index} has no Value"))
                })?;
                mapper
                    .tap_changer_set_value(store, ctx, control.number, value)
                    .map(|_| ())
            }
            (device, command) => {
                rtu_debug!(
                    context = ctx,
                    "command not recognised for {} {} - {}",
                    device.as_str(),
                    control.number,
                    command
                );
                Ok(())
            }
        }
    }

    fn connect_state(&mut self, ctx: &InstanceContext, payload: &str, store: &PointStore) {
        let Ok(next) = LinkState::from_str(payload.trim()) else {
            rtu_warn!(context = ctx, "unrecognised ConnectState payload {:?}", payload);
            return;
        };
        let previous = std::mem::replace(&mut self.link, next);
        rtu_debug!(context = ctx, "link state {} -> {}", previous, next);
        if next == LinkState::Connected {
            let published = store.publish_all(ctx);
            rtu_info!(
                context = ctx,
                "connected (was {}), replayed {} points",
                previous,
                published
            );
        }
    }
}
