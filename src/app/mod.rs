//! Binary-side wiring: config resolution, progress display, command dispatch.

pub(crate) mod config;
pub(crate) mod progress;
pub(crate) mod runtime;
