//! The primary engine service hosted by the node and the miner it owns.

mod chain;
mod miner;
mod service;

pub use chain::ChainState;
pub use miner::Miner;
pub use service::EngineService;
