//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Instance-attributed logging adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

/// Shared expansion for the `rtu_*` macros. Not part of the public surface.
#[doc(hidden)]
#[macro_export]
macro_rules! __rtu_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            instance_id = ctx.instance_id,
            port = %ctx.name,
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit a trace log attributed to a port instance.
#[macro_export]
macro_rules! rtu_trace {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::TRACE, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::TRACE, $crate::InstanceContext::unassigned(), $($arg)+)
    };
}

/// Emit a debug log attributed to a port instance.
#[macro_export]
macro_rules! rtu_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::DEBUG, $crate::InstanceContext::unassigned(), $($arg)+)
    };
}

/// Emit an informational log attributed to a port instance.
#[macro_export]
macro_rules! rtu_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::INFO, $crate::InstanceContext::unassigned(), $($arg)+)
    };
}

/// Emit a warning attributed to a port instance.
#[macro_export]
macro_rules! rtu_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::WARN, $crate::InstanceContext::unassigned(), $($arg)+)
    };
}

/// Emit an error log attributed to a port instance.
#[macro_export]
macro_rules! rtu_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rtu_event!(tracing::Level::ERROR, $crate::InstanceContext::unassigned(), $($arg)+)
    };
}

/// Emit a critical log. Recorded at `ERROR` with `critical = true` so filters can tell it apart.
#[macro_export]
macro_rules! rtu_critical {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::ERROR,
            critical = true,
            instance_id = ctx.instance_id,
            port = %ctx.name,
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {
        $crate::rtu_critical!(context = $crate::InstanceContext::unassigned(), $($arg)+)
    };
}
