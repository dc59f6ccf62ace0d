//! Lifecycle capabilities shared by every hosted service.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// A unit the node can register and start. Implementations spawn their own
/// background work from `start` and must return promptly.
#[async_trait]
pub trait Service: Send + Sync {
    /// Stable identifier, unique within a node.
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), ServiceError>;

    async fn stop(&self) -> Result<(), ServiceError>;
}

/// The core engine. Besides the plain lifecycle it owns the miner and
/// publishes the chain height observed by the monitor.
pub trait PrimaryService: Service {
    fn miner(&self) -> Arc<dyn MinerControl>;

    fn chain_height(&self) -> u64;
}

/// Controllable block producer owned by the primary service.
pub trait MinerControl: Send + Sync {
    fn start(&self) -> Result<(), MinerError>;

    fn stop(&self);

    fn is_mining(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service `{0}` is already running")]
    AlreadyRunning(String),
    #[error("service `{0}` is not running")]
    NotRunning(String),
    #[error("invalid service setup: {0}")]
    InvalidSetup(String),
    #[error("miner error: {0}")]
    Miner(#[from] MinerError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MinerError {
    #[error("miner is already running")]
    AlreadyMining,
    #[error("coinbase is not configured")]
    MissingCoinbase,
    #[error("engine is not running")]
    EngineStopped,
}
