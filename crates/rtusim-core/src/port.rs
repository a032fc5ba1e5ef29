//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! The simulated RTU as a host-driven state machine.

use std::sync::Arc;

use rtusim_common::SimConfig;
use rtusim_logging::{rtu_debug, rtu_error, rtu_info, rtu_trace, InstanceContext};

use crate::control::ControlMapper;
use crate::dispatcher::{EventDispatcher, InboundEvent, LinkState};
use crate::rest::{self, RestRequest};
use crate::store::{PointStore, Publisher};

/// Callbacks a gateway host invokes on a port, one call at a time.
pub trait HostPort: Send {
    /// Record the identity the host assigned to this instance.
    fn init(&mut self, ctx: InstanceContext);
    /// Apply the main and override configuration documents.
    fn configure(&mut self, main_json: &str, override_json: &str);
    fn enable(&mut self);
    fn disable(&mut self);
    /// The host finished building and expects the port to publish its state.
    fn operational(&mut self);
    /// Returns whether the event was handled.
    fn handle_event(&mut self, event: &InboundEvent) -> bool;
    fn handle_timer(&mut self, timer_id: u32);
    /// Returns the response body; an empty string reports a bad request.
    fn handle_request(&mut self, method_and_url: &str, body: &str) -> String;
}

/// Simulated RTU exposing the configured points and device controls.
pub struct SimPort {
    ctx: InstanceContext,
    config: Option<SimConfig>,
    store: PointStore,
    mapper: ControlMapper,
    dispatcher: EventDispatcher,
    publisher: Arc<dyn Publisher>,
    enabled: bool,
}

impl std::fmt::Debug for SimPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimPort")
            .field("ctx", &self.ctx)
            .field("configured", &self.config.is_some())
            .field("store", &self.store)
            .field("link", &self.dispatcher.link_state())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SimPort {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            ctx: InstanceContext::unassigned(),
            config: None,
            store: PointStore::empty(Arc::clone(&publisher)),
            mapper: ControlMapper::default(),
            dispatcher: EventDispatcher::new(),
            publisher,
            enabled: false,
        }
    }

    pub fn context(&self) -> &InstanceContext {
        &self.ctx
    }

    /// The active configuration snapshot, if one was accepted.
    pub fn config(&self) -> Option<&SimConfig> {
        self.config.as_ref()
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    pub fn mapper(&self) -> &ControlMapper {
        &self.mapper
    }

    pub fn link_state(&self) -> LinkState {
        self.dispatcher.link_state()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the snapshot and rebuild the points, or change nothing on error.
    pub fn try_configure(&mut self, main_json: &str, override_json: &str) -> crate::Result<()> {
        let config = SimConfig::merge(self.config.as_ref(), main_json, override_json)?;
        self.store = PointStore::from_config(&config, Arc::clone(&self.publisher));
        self.mapper = ControlMapper::from_config(&config);
        rtu_info!(
            context = self.ctx,
            "configured {} analogs, {} binaries, {} controls",
            config.analogs.len(),
            config.binaries.len(),
            config.binary_controls.len()
        );
        self.config = Some(config);
        Ok(())
    }

    fn serve(&mut self, method_and_url: &str, body: &str) -> crate::Result<String> {
        let request = RestRequest::parse(method_and_url)?;
        rest::respond(&mut self.store, &self.mapper, &self.ctx, &request, body)
    }
}

impl HostPort for SimPort {
    fn init(&mut self, ctx: InstanceContext) {
        rtu_debug!(context = ctx, "port instance created");
        self.ctx = ctx;
    }

    fn configure(&mut self, main_json: &str, override_json: &str) {
        if let Err(err) = self.try_configure(main_json, override_json) {
            rtu_error!(context = self.ctx, "keeping previous configuration: {}", err);
        }
    }

    fn enable(&mut self) {
        rtu_trace!(context = self.ctx, "enabled");
        self.enabled = true;
    }

    fn disable(&mut self) {
        rtu_debug!(context = self.ctx, "disabled");
        self.enabled = false;
    }

    fn operational(&mut self) {
        let published = self.store.publish_all(&self.ctx);
        rtu_trace!(context = self.ctx, "operational, published {} points", published);
    }

    fn handle_event(&mut self, event: &InboundEvent) -> bool {
        self.dispatcher
            .handle(&self.ctx, event, &mut self.store, &self.mapper)
    }

    fn handle_timer(&mut self, timer_id: u32) {
        rtu_debug!(context = self.ctx, "timer {} expired", timer_id);
    }

    fn handle_request(&mut self, method_and_url: &str, body: &str) -> String {
        match self.serve(method_and_url, body) {
            Ok(response) => response,
            Err(err) => {
                rtu_error!(context = self.ctx, "request {:?} failed: {}", method_and_url, err);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointKind;
    use crate::store::RecordingPublisher;
    use serde_json::json;

    fn main_doc() -> String {
        json!({
            "Analogs": [{"Index": 0, "Type": "TapChanger", "Number": 1, "Value": 3}],
            "Binaries": [
                {"Index": 0, "Type": "CB", "Number": 1, "BitID": 0, "Value": 1},
                {"Index": 1, "Type": "CB", "Number": 1, "BitID": 1, "Value": 0}
            ],
            "BinaryControls": [{"Index": 0, "Type": "CB", "Number": 1, "Command": "Trip"}]
        })
        .to_string()
    }

    fn configured() -> (SimPort, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let mut port = SimPort::new(publisher.clone());
        port.init(InstanceContext::new(7, "RTU7"));
        port.configure(&main_doc(), "");
        (port, publisher)
    }

    #[test]
    fn configure_builds_points_from_the_snapshot() {
        let (port, publisher) = configured();
        assert_eq!(port.context().name, "RTU7");
        assert_eq!(port.store().len(PointKind::Binary), 2);
        assert_eq!(port.store().len(PointKind::Analog), 1);
        assert!(port.mapper().resolve_control(0).is_ok());
        assert!(publisher.is_empty());
    }

    #[test]
    fn bad_override_keeps_previous_snapshot() {
        let (mut port, _) = configured();
        let before = port.config().unwrap().merged_json();
        port.configure("", "{\"Binaries\": [");
        assert_eq!(port.config().unwrap().merged_json(), before);
        assert_eq!(port.store().len(PointKind::Binary), 2);
    }

    #[test]
    fn rejected_configuration_is_a_config_parse_error() {
        let (mut port, _) = configured();
        let err = port.try_configure("[]", "").unwrap_err();
        assert!(matches!(err, crate::RtuError::ConfigParse(_)));
        assert!(err.to_string().starts_with("configuration rejected"));
    }

    #[test]
    fn override_with_empty_main_reuses_previous_document() {
        let (mut port, _) = configured();
        let analogs = json!({"Analogs": [
            {"Index": 0, "Type": "TapChanger", "Number": 1, "Value": 3},
            {"Index": 1, "Type": "Voltage", "Number": 1, "Value": 11.5}
        ]})
        .to_string();
        port.configure("", &analogs);
        assert_eq!(port.store().len(PointKind::Analog), 2);
        assert_eq!(port.store().len(PointKind::Binary), 2);
    }

    #[test]
    fn operational_replays_all_points() {
        let (mut port, publisher) = configured();
        port.operational();
        let values: Vec<_> = publisher.changes().into_iter().map(|c| c.value).collect();
        assert_eq!(values, vec!["3", "1", "0"]);
    }

    #[test]
    fn requests_return_empty_body_on_error() {
        let (mut port, _) = configured();
        assert_eq!(
            port.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=1", ""),
            r#"{"Bit0":1,"Bit1":0,"State":"Closed"}"#
        );
        assert_eq!(port.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=9", ""), "");
        assert_eq!(port.handle_request("PUT /PyPortRtuSim/set", "{}"), "");
        assert_eq!(port.handle_request("GET /PyPortRtuSim/set", ""), "");
        assert_eq!(port.handle_request("POST /PyPortRtuSim/set", "{"), "");
    }

    #[test]
    fn enable_flag_tracks_lifecycle() {
        let (mut port, _) = configured();
        assert!(!port.is_enabled());
        port.enable();
        assert!(port.is_enabled());
        port.disable();
        assert!(!port.is_enabled());
    }
}
