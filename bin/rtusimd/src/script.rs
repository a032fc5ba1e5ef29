//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the RTU simulator harness."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Scripted host traffic: a JSON array of events and requests.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rtusim_core::{HostPort, InboundEvent, PortHost};
use rtusim_logging::{log_host_message, HostLogLevel};
use serde::Deserialize;

fn default_quality() -> String {
    "|ONLINE|".to_owned()
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Event {
        event: String,
        #[serde(default)]
        index: u32,
        #[serde(default)]
        payload: String,
        #[serde(default = "default_quality")]
        quality: String,
    },
    Request {
        request: String,
        #[serde(default)]
        body: String,
    },
    Timer {
        timer: u32,
    },
    /// A line in the port's log, as the host would write it.
    Log {
        log: HostLogLevel,
        message: String,
    },
}

impl ScriptStep {
    pub fn load(path: &Path) -> Result<Vec<Self>> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Vec<Self>> {
        serde_json::from_str(contents).context("script must be a JSON array of steps")
    }

    /// Run the step and return the text to print.
    pub fn run<P: HostPort>(&self, host: &PortHost<P>) -> String {
        match self {
            ScriptStep::Event {
                event,
                index,
                payload,
                quality,
            } => {
                let inbound = InboundEvent::new(event, *index)
                    .with_payload(payload.clone())
                    .with_quality(quality.clone())
                    .with_sender("script");
                serde_json::json!({ "event": event, "status": host.handle_event(&inbound) })
                    .to_string()
            }
            ScriptStep::Request { request, body } => {
                let response = host.handle_request(request, body);
                serde_json::json!({ "request": request, "response": response }).to_string()
            }
            ScriptStep::Timer { timer } => {
                host.fire_timer(*timer);
                String::new()
            }
            ScriptStep::Log { log, message } => {
                log_host_message(&host.context(), *log, message);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtusim_core::{NullTimerService, RecordingPublisher, SimPort};
    use rtusim_logging::InstanceContext;
    use std::sync::Arc;

    #[test]
    fn steps_are_recognised_by_their_keys() {
        let steps = ScriptStep::parse(
            r#"[
                {"event": "ConnectState", "payload": "CONNECTED"},
                {"request": "POST /PyPortRtuSim/set", "body": "{}"},
                {"timer": 4},
                {"log": "Warn", "message": "breaker drill starts"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                ScriptStep::Event {
                    event: "ConnectState".into(),
                    index: 0,
                    payload: "CONNECTED".into(),
                    quality: "|ONLINE|".into(),
                },
                ScriptStep::Request {
                    request: "POST /PyPortRtuSim/set".into(),
                    body: "{}".into(),
                },
                ScriptStep::Timer { timer: 4 },
                ScriptStep::Log {
                    log: HostLogLevel::Warn,
                    message: "breaker drill starts".into(),
                },
            ]
        );
        assert!(ScriptStep::parse(r#"{"event": "ConnectState"}"#).is_err());
        assert!(ScriptStep::parse(r#"[{"log": "Loud", "message": "x"}]"#).is_err());
    }

    #[test]
    fn steps_drive_the_host() {
        let publisher = Arc::new(RecordingPublisher::new());
        let host = PortHost::new(
            SimPort::new(publisher.clone()),
            InstanceContext::new(1, "RTU1"),
            Arc::new(NullTimerService),
        );
        host.configure(
            r#"{"Binaries": [
                {"Index": 0, "Type": "CB", "Number": 1, "BitID": 0, "Value": 0},
                {"Index": 1, "Type": "CB", "Number": 1, "BitID": 1, "Value": 0}
            ]}"#,
            "",
        );
        host.enable();

        let set = ScriptStep::Request {
            request: "POST /PyPortRtuSim/set".into(),
            body: r#"{"Type":"CB","Number":1,"State":"Closed"}"#.into(),
        };
        assert_eq!(
            set.run(&host),
            r#"{"request":"POST /PyPortRtuSim/set","response":"{\"Result\":\"OK\"}"}"#
        );
        assert_eq!(publisher.len(), 1);

        let connect = ScriptStep::Event {
            event: "ConnectState".into(),
            index: 0,
            payload: "CONNECTED".into(),
            quality: default_quality(),
        };
        assert_eq!(
            connect.run(&host),
            r#"{"event":"ConnectState","status":"SUCCESS"}"#
        );
        assert_eq!(publisher.len(), 3);

        let note = ScriptStep::Log {
            log: HostLogLevel::Info,
            message: "drill complete".into(),
        };
        assert_eq!(note.run(&host), "");
        assert_eq!(publisher.len(), 3);
    }
}
