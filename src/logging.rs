//! Process-aware logging helpers
//!
//! Every participant in a run is a separate process writing to the same
//! inherited stderr, so each event carries the emitting pid.

pub fn debug(message: impl AsRef<str>) {
    tracing::debug!(pid = std::process::id(), "{}", message.as_ref());
}

pub fn info(message: impl AsRef<str>) {
    tracing::info!(pid = std::process::id(), "{}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    tracing::warn!(pid = std::process::id(), "{}", message.as_ref());
}

pub fn error(message: impl AsRef<str>) {
    tracing::error!(pid = std::process::id(), "{}", message.as_ref());
}
