//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use rtusim_core::{
    CommandStatus, ControlMapper, HostPort, InboundEvent, LinkState, NullTimerService, PointKind,
    PointValue, PortHost, QualityFlags, RecordingPublisher, RtuError, SimPort,
};
use rtusim_logging::InstanceContext;
use serde_json::{json, Value};

fn breaker_config() -> String {
    json!({
        "Binaries": [
            {"Index": 1, "Type": "CB", "Number": 1, "BitID": 0, "Value": 0},
            {"Index": 2, "Type": "CB", "Number": 1, "BitID": 1, "Value": 0}
        ]
    })
    .to_string()
}

fn substation_config() -> String {
    json!({
        "Analogs": [
            {"Index": 0, "Type": "TapChanger", "Number": 1, "Value": 5, "Min": 1, "Max": 16},
            {"Index": 1, "Type": "Voltage", "Number": 1, "Value": 11.25}
        ],
        "Binaries": [
            {"Index": 0, "Type": "CB", "Number": 1, "BitID": 0, "Value": 1},
            {"Index": 1, "Type": "CB", "Number": 1, "BitID": 1, "Value": 0},
            {"Index": 2, "Type": "CB", "Number": 2, "BitID": 0, "Value": 0},
            {"Index": 3, "Type": "CB", "Number": 2, "BitID": 1, "Value": 1}
        ],
        "BinaryControls": [
            {"Index": 0, "Type": "CB", "Number": 1, "Command": "Trip"},
            {"Index": 1, "Type": "CB", "Number": 1, "Command": "Close"},
            {"Index": 2, "Type": "TapChanger", "Number": 1, "Command": "Raise"},
            {"Index": 3, "Type": "TapChanger", "Number": 1, "Command": "Lower"}
        ]
    })
    .to_string()
}

fn running_host(main: &str) -> (PortHost<SimPort>, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::new());
    let host = PortHost::new(
        SimPort::new(publisher.clone()),
        InstanceContext::new(42, "RTU1"),
        Arc::new(NullTimerService),
    );
    host.configure(main, "");
    host.enable();
    (host, publisher)
}

fn json_body(response: &str) -> Value {
    serde_json::from_str(response)
        .unwrap_or_else(|err| panic!("response {response:?} is not JSON: {err}"))
}

#[test]
fn lookup_by_index_finds_exactly_the_configured_points() {
    let (host, _) = running_host(&substation_config());
    host.with_port(|port| {
        let store = port.store();
        for index in 0..4 {
            assert!(store.lookup_by_index(PointKind::Binary, index).is_ok());
        }
        for index in 0..2 {
            assert!(store.lookup_by_index(PointKind::Analog, index).is_ok());
        }
        assert!(matches!(
            store.lookup_by_index(PointKind::Binary, 4),
            Err(RtuError::NotFound { .. })
        ));
        assert!(matches!(
            store.lookup_by_index(PointKind::Analog, 2),
            Err(RtuError::NotFound { .. })
        ));
    });
}

#[test]
fn open_scenario_follows_the_literal_tables() {
    let (host, publisher) = running_host(&breaker_config());
    let response = host.handle_request(
        "POST /PyPortRtuSim/set",
        r#"{"Type":"CB","Number":1,"State":"Open"}"#,
    );
    assert_eq!(json_body(&response), json!({"Result": "OK"}));

    // bit0 already 0: only bit1 is published
    let changes = publisher.take();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].index, 2);
    assert_eq!(changes[0].value, "1");

    let status = host.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=1", "");
    assert_eq!(
        json_body(&status),
        json!({"Bit0": 0, "Bit1": 1, "State": "Open"})
    );
}

#[test]
fn fault_request_sets_both_bits() {
    let (host, publisher) = running_host(&breaker_config());
    let response = host.handle_request(
        "POST /PyPort/RTU1/PyPortRtuSim/set",
        r#"{"Type":"CB","Number":1,"State":"Fault"}"#,
    );
    assert_eq!(json_body(&response), json!({"Result": "OK"}));
    host.with_port(|port| {
        for index in [1, 2] {
            assert_eq!(
                port.store().lookup_by_index(PointKind::Binary, index).unwrap().value,
                PointValue::Binary(1)
            );
        }
    });
    assert_eq!(publisher.len(), 2);
}

#[test]
fn unknown_breaker_command_changes_nothing() {
    let (host, publisher) = running_host(&breaker_config());
    let response = host.handle_request(
        "POST /PyPortRtuSim/set",
        r#"{"Type":"CB","Number":1,"State":"Jammed"}"#,
    );
    assert_eq!(response, "");
    assert!(publisher.is_empty());
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=1", "");
    assert_eq!(json_body(&status)["State"], "Maintenance");
}

#[test]
fn connected_replays_each_point_once_with_online_quality() {
    let (host, publisher) = running_host(&substation_config());
    let status = host.handle_event(&InboundEvent::new("ConnectState", 0).with_payload("CONNECTED"));
    assert_eq!(status, CommandStatus::Success);

    let changes = publisher.take();
    assert_eq!(changes.len(), 6);
    assert!(changes.iter().all(|c| c.quality == QualityFlags::ONLINE));
    let analogs: Vec<_> = changes
        .iter()
        .filter(|c| c.kind == PointKind::Analog)
        .map(|c| (c.index, c.value.as_str()))
        .collect();
    assert_eq!(analogs, vec![(0, "5"), (1, "11.25")]);
    assert_eq!(host.with_port(|port| port.link_state()), LinkState::Connected);
}

#[test]
fn malformed_override_keeps_the_active_snapshot() {
    let (host, publisher) = running_host(&substation_config());
    let before = host.with_port(|port| port.config().map(|c| c.merged_json()));
    host.configure("", r#"{"Binaries": [{"Index": "#);
    host.configure(&breaker_config(), "[1, 2]");
    let after = host.with_port(|port| port.config().map(|c| c.merged_json()));
    assert_eq!(before, after);
    assert!(publisher.is_empty());

    // the old points still answer
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=2", "");
    assert_eq!(json_body(&status)["State"], "Open");
}

#[test]
fn override_replaces_whole_top_level_keys() {
    let publisher = Arc::new(RecordingPublisher::new());
    let mut port = SimPort::new(publisher.clone());
    port.init(InstanceContext::new(9, "RTU9"));
    let override_doc = json!({
        "Analogs": [{"Index": 7, "Type": "TapChanger", "Number": 1, "Value": 2}]
    })
    .to_string();
    port.configure(&substation_config(), &override_doc);

    assert_eq!(port.store().len(PointKind::Analog), 1);
    assert_eq!(port.store().len(PointKind::Binary), 4);
    assert_eq!(ControlMapper::tap_changer_value(port.store(), 1).unwrap(), 2.0);
    // limits of the replaced analog are gone; default range applies
    assert_eq!(port.mapper().tap_limits(1).max, 255.0);
}

#[test]
fn controls_drive_breakers_and_tap_changers() {
    let (host, _) = running_host(&substation_config());
    let crob = |index| InboundEvent::new("ControlRelayOutputBlock", index).with_sender("Master");

    assert_eq!(host.handle_event(&crob(0)), CommandStatus::Success);
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=1", "");
    assert_eq!(json_body(&status)["State"], "Open");

    host.handle_event(&crob(1));
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=1", "");
    assert_eq!(json_body(&status)["State"], "Closed");

    host.handle_event(&crob(2));
    host.handle_event(&crob(2));
    host.handle_event(&crob(3));
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=TapChanger&Number=1", "");
    assert_eq!(status, r#"{"State":6}"#);
}

#[test]
fn tap_changer_set_is_clamped_and_validated() {
    let (host, _) = running_host(&substation_config());
    let set = |value: &str| {
        host.handle_request(
            "POST /PyPortRtuSim/set",
            &format!(r#"{{"Type":"TapChanger","Number":"1","Value":{value}}}"#),
        )
    };
    assert_eq!(json_body(&set("\"12\"")), json!({"Result": "OK"}));
    assert_eq!(json_body(&set("99")), json!({"Result": "OK"}));
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=TapChanger&Number=1", "");
    assert_eq!(status, r#"{"State":16}"#);
    assert_eq!(set("3.5"), "");
}

#[test]
fn tap_limits_outside_the_position_policy_are_refused() {
    let (host, _) = running_host(&substation_config());
    let lone_min = json!({
        "Analogs": [{"Index": 0, "Type": "TapChanger", "Number": 1, "Value": 5, "Min": 300}]
    })
    .to_string();
    let fractional = json!({
        "Analogs": [
            {"Index": 0, "Type": "TapChanger", "Number": 1, "Value": 5, "Min": 0.5, "Max": 9.5}
        ]
    })
    .to_string();
    for override_doc in [&lone_min, &fractional] {
        host.configure("", override_doc);
        host.with_port(|port| {
            let limits = port.mapper().tap_limits(1);
            assert_eq!((limits.min, limits.max), (1.0, 16.0));
        });
    }

    let response = host.handle_request(
        "POST /PyPortRtuSim/set",
        r#"{"Type":"TapChanger","Number":1,"Value":20}"#,
    );
    assert_eq!(json_body(&response), json!({"Result": "OK"}));
    let status = host.handle_request("GET /PyPortRtuSim/status?Type=TapChanger&Number=1", "");
    assert_eq!(status, r#"{"State":16}"#);
}

#[test]
fn routes_accept_a_trailing_slash() {
    let (host, _) = running_host(&substation_config());
    let status = host.handle_request("GET /PyPort/RTU1/PyPortRtuSim/status/?Type=CB&Number=2", "");
    assert_eq!(json_body(&status)["State"], "Open");
    let response = host.handle_request(
        "POST /PyPortRtuSim/set/",
        r#"{"Type":"CB","Number":2,"State":"Closed"}"#,
    );
    assert_eq!(json_body(&response), json!({"Result": "OK"}));
    assert_eq!(host.handle_request("GET /PyPortRtuSim/statuses", ""), "");
}

#[test]
fn disabled_host_rejects_traffic() {
    let (host, publisher) = running_host(&substation_config());
    host.disable();
    assert_eq!(
        host.handle_request("GET /PyPortRtuSim/status?Type=CB&Number=1", ""),
        "Error Port not enabled"
    );
    assert_eq!(
        host.handle_event(&InboundEvent::new("ConnectState", 0).with_payload("CONNECTED")),
        CommandStatus::Undefined
    );
    assert!(publisher.is_empty());
}

#[test]
fn operational_publishes_initial_state() {
    let (host, publisher) = running_host(&breaker_config());
    host.operational();
    let changes = publisher.changes();
    assert_eq!(changes.len(), 2);
    let rendered = serde_json::to_value(&changes[0]).unwrap();
    assert_eq!(
        rendered,
        json!({"kind": "Binary", "index": 1, "quality": "|ONLINE|", "value": "0"})
    );
}
