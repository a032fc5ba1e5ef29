//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Embedding layer between a gateway host and a [`HostPort`].
//!
//! All calls are serialised through one lock, and the port only sees events,
//! requests and timers while it is enabled.

use std::sync::Arc;

use parking_lot::Mutex;
use rtusim_logging::{rtu_debug, InstanceContext};
use serde::Serialize;
use strum::Display;

use crate::dispatcher::InboundEvent;
use crate::port::HostPort;

/// Response returned to the host for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Success,
    Undefined,
}

impl From<bool> for CommandStatus {
    fn from(handled: bool) -> Self {
        if handled {
            CommandStatus::Success
        } else {
            CommandStatus::Undefined
        }
    }
}

pub const PORT_NOT_ENABLED: &str = "Error Port not enabled";

/// Host timer registration.
pub trait TimerService: Send + Sync {
    fn schedule(&self, ctx: &InstanceContext, timer_id: u32, delay_ms: u64);
}

/// Timer service that drops every registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTimerService;

impl TimerService for NullTimerService {
    fn schedule(&self, ctx: &InstanceContext, timer_id: u32, delay_ms: u64) {
        rtu_debug!(context = ctx, "timer {} ({} ms) discarded", timer_id, delay_ms);
    }
}

struct HostState<P> {
    port: P,
    ctx: InstanceContext,
    enabled: bool,
}

/// Thread-safe wrapper that gates host calls into a port.
pub struct PortHost<P: HostPort> {
    state: Mutex<HostState<P>>,
    timers: Arc<dyn TimerService>,
}

impl<P: HostPort> std::fmt::Debug for PortHost<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PortHost")
            .field("ctx", &state.ctx)
            .field("enabled", &state.enabled)
            .finish()
    }
}

impl<P: HostPort> PortHost<P> {
    /// Create the host wrapper and run the port's `init`.
    pub fn new(mut port: P, ctx: InstanceContext, timers: Arc<dyn TimerService>) -> Self {
        port.init(ctx.clone());
        Self {
            state: Mutex::new(HostState {
                port,
                ctx,
                enabled: false,
            }),
            timers,
        }
    }

    pub fn context(&self) -> InstanceContext {
        self.state.lock().ctx.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Run a closure against the wrapped port under the host lock.
    pub fn with_port<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.state.lock().port)
    }

    pub fn configure(&self, main_json: &str, override_json: &str) {
        self.state.lock().port.configure(main_json, override_json);
    }

    /// Enable the port. A repeated enable is not forwarded.
    pub fn enable(&self) {
        let mut state = self.state.lock();
        if state.enabled {
            return;
        }
        state.enabled = true;
        state.port.enable();
    }

    /// Disable the port. A repeated disable is not forwarded.
    pub fn disable(&self) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        state.enabled = false;
        state.port.disable();
    }

    pub fn operational(&self) {
        self.state.lock().port.operational();
    }

    pub fn handle_event(&self, event: &InboundEvent) -> CommandStatus {
        let mut state = self.state.lock();
        if !state.enabled {
            rtu_debug!(context = state.ctx, "event ignored while disabled");
            return CommandStatus::Undefined;
        }
        CommandStatus::from(state.port.handle_event(event))
    }

    pub fn handle_request(&self, method_and_url: &str, body: &str) -> String {
        let mut state = self.state.lock();
        if !state.enabled {
            return PORT_NOT_ENABLED.to_owned();
        }
        state.port.handle_request(method_and_url, body)
    }

    /// Ask the timer service for a callback after `delay_ms`. Ignored while disabled.
    pub fn set_timer(&self, timer_id: u32, delay_ms: u64) {
        let state = self.state.lock();
        if !state.enabled {
            rtu_debug!(context = state.ctx, "timer {} ignored while disabled", timer_id);
            return;
        }
        self.timers.schedule(&state.ctx, timer_id, delay_ms);
    }

    /// Deliver a timer expiry to the port.
    pub fn fire_timer(&self, timer_id: u32) {
        self.state.lock().port.handle_timer(timer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ProbePort {
        calls: Vec<String>,
    }

    impl HostPort for ProbePort {
        fn init(&mut self, ctx: InstanceContext) {
            self.calls.push(format!("init {}", ctx.name));
        }
        fn configure(&mut self, _main_json: &str, _override_json: &str) {
            self.calls.push("configure".into());
        }
        fn enable(&mut self) {
            self.calls.push("enable".into());
        }
        fn disable(&mut self) {
            self.calls.push("disable".into());
        }
        fn operational(&mut self) {
            self.calls.push("operational".into());
        }
        fn handle_event(&mut self, event: &InboundEvent) -> bool {
            self.calls.push(format!("event {}", event.index));
            event.index != 13
        }
        fn handle_timer(&mut self, timer_id: u32) {
            self.calls.push(format!("timer {timer_id}"));
        }
        fn handle_request(&mut self, method_and_url: &str, _body: &str) -> String {
            self.calls.push(format!("request {method_and_url}"));
            "{}".into()
        }
    }

    #[derive(Default)]
    struct RecordingTimers {
        scheduled: Mutex<Vec<(u32, u64)>>,
    }

    impl TimerService for RecordingTimers {
        fn schedule(&self, _ctx: &InstanceContext, timer_id: u32, delay_ms: u64) {
            self.scheduled.lock().push((timer_id, delay_ms));
        }
    }

    fn host() -> PortHost<ProbePort> {
        PortHost::new(
            ProbePort::default(),
            InstanceContext::new(1, "RTU1"),
            Arc::new(NullTimerService),
        )
    }

    fn calls(host: &PortHost<ProbePort>) -> Vec<String> {
        host.with_port(|port| port.calls.clone())
    }

    #[test]
    fn enable_and_disable_are_idempotent() {
        let host = host();
        host.enable();
        host.enable();
        host.disable();
        host.disable();
        assert_eq!(calls(&host), vec!["init RTU1", "enable", "disable"]);
    }

    #[test]
    fn disabled_port_sees_no_events_or_requests() {
        let host = host();
        assert_eq!(
            host.handle_event(&InboundEvent::new("ConnectState", 1)),
            CommandStatus::Undefined
        );
        assert_eq!(host.handle_request("GET /x", ""), PORT_NOT_ENABLED);
        assert_eq!(calls(&host), vec!["init RTU1"]);
    }

    #[test]
    fn event_results_map_to_command_status() {
        let host = host();
        host.enable();
        assert_eq!(
            host.handle_event(&InboundEvent::new("Binary", 2)),
            CommandStatus::Success
        );
        assert_eq!(
            host.handle_event(&InboundEvent::new("Binary", 13)),
            CommandStatus::Undefined
        );
        assert_eq!(host.handle_request("GET /x", ""), "{}");
        assert_eq!(CommandStatus::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn timers_only_scheduled_while_enabled() {
        let timers = Arc::new(RecordingTimers::default());
        let host = PortHost::new(
            ProbePort::default(),
            InstanceContext::new(2, "RTU2"),
            timers.clone(),
        );
        host.set_timer(1, 500);
        host.enable();
        host.set_timer(2, 250);
        host.fire_timer(2);
        assert_eq!(*timers.scheduled.lock(), vec![(2, 250)]);
        assert_eq!(calls(&host).last().map(String::as_str), Some("timer 2"));
    }
}
