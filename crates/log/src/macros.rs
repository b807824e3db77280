//! Level-dispatching event macro

/// Emit a `tracing` event at a [`Level`](crate::Level) chosen at runtime.
///
/// `tracing` macros need the level at compile time; this expands to one
/// arm per level.
///
/// ```rust
/// use orbit_log::Level;
///
/// let level = Level::Warn;
/// orbit_log::event_at!(level, action = "status", "action failed");
/// ```
#[macro_export]
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            $crate::Level::Trace => ::tracing::trace!($($arg)+),
            $crate::Level::Debug => ::tracing::debug!($($arg)+),
            $crate::Level::Info => ::tracing::info!($($arg)+),
            $crate::Level::Warn => ::tracing::warn!($($arg)+),
            $crate::Level::Error => ::tracing::error!($($arg)+),
        }
    };
}
