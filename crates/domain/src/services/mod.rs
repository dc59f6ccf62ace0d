//! Shared service helpers: telemetry wiring and the metrics reporter.

pub mod influx;
pub mod reporter;
pub mod snapshot;
pub mod telemetry;

pub use influx::*;
pub use reporter::*;
pub use snapshot::*;
pub use telemetry::*;
