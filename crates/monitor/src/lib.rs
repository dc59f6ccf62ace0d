//! Monitor service that periodically samples the engine and the node hosting
//! it, keeping the latest status available to callers.

mod service;
pub mod status;
mod worker;

pub use service::MonitorService;
pub use status::{NodeStatus, StatusProbe};
