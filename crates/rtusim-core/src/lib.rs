//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Point-state simulation and control mapping for a simulated RTU.
//!
//! [`PointStore`] holds the configured binary and analog points and publishes
//! every change. [`ControlMapper`] turns breaker and tap-changer commands into
//! point writes, [`EventDispatcher`] routes host events, and [`SimPort`] ties
//! them together behind the [`HostPort`] callbacks. [`PortHost`] is the thin
//! embedding layer a gateway host drives.

pub mod control;
pub mod dispatcher;
pub mod errors;
pub mod host;
pub mod point;
pub mod port;
pub mod rest;
pub mod status;
pub mod store;

pub use control::{CbCommand, CbReading, CbState, ControlDefinition, ControlMapper, DeviceType, TapLimits};
pub use dispatcher::{EventDispatcher, EventType, InboundEvent, LinkState};
pub use errors::{LookupQuery, Result, RtuError};
pub use host::{CommandStatus, NullTimerService, PortHost, TimerService, PORT_NOT_ENABLED};
pub use point::{Point, PointChange, PointKind, PointValue, QualityFlags};
pub use port::{HostPort, SimPort};
pub use rest::{HttpMethod, RestRequest};
pub use status::{get_status, set_status, DeviceStatus, SetRequest, SetResponse};
pub use store::{PointStore, Publisher, RecordingPublisher};
