//! Tracing and logging setup shared by the service binaries.

pub mod logging;

pub use logging::init;
