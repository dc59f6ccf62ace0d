use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use keel_domain::{
    EngineConfig, MinerControl, PrimaryService, Service, ServiceContext, ServiceError,
};
use tracing::info;

use crate::{chain::ChainState, miner::Miner};

const SERVICE_NAME: &str = "engine";

/// The node's primary service: owns the chain state and the miner.
pub struct EngineService {
    chain_dir: PathBuf,
    chain: Arc<ChainState>,
    miner: Arc<Miner>,
}

impl EngineService {
    pub const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(context: ServiceContext, config: &EngineConfig) -> Result<Self, ServiceError> {
        Self::with_block_interval(context, config, Self::DEFAULT_BLOCK_INTERVAL)
    }

    pub fn with_block_interval(
        context: ServiceContext,
        config: &EngineConfig,
        block_interval: Duration,
    ) -> Result<Self, ServiceError> {
        if context.data_dir.as_os_str().is_empty() {
            return Err(ServiceError::InvalidSetup(
                "engine requires a data dir".to_string(),
            ));
        }
        if block_interval.is_zero() {
            return Err(ServiceError::InvalidSetup(
                "block interval must be positive".to_string(),
            ));
        }

        let chain = Arc::new(ChainState::new(config.network_id, config.genesis.clone()));
        let miner = Arc::new(Miner::new(
            config.coinbase.clone(),
            Arc::clone(&chain),
            block_interval,
        ));
        let chain_dir = context.data_dir.join("db").join("chain");

        Ok(Self {
            chain_dir,
            chain,
            miner,
        })
    }

    pub fn chain(&self) -> &ChainState {
        &self.chain
    }

    pub fn chain_dir(&self) -> &Path {
        &self.chain_dir
    }

    pub fn is_running(&self) -> bool {
        self.chain.is_running()
    }
}

#[async_trait]
impl Service for EngineService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn start(&self) -> Result<(), ServiceError> {
        if self.chain.is_running() {
            return Err(ServiceError::AlreadyRunning(SERVICE_NAME.to_string()));
        }

        fs::create_dir_all(&self.chain_dir)?;
        self.chain.set_running(true);
        info!(
            network_id = self.chain.network_id(),
            shard = self.chain.genesis().shard_number,
            chain_dir = %self.chain_dir.display(),
            "engine started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if !self.chain.is_running() {
            return Err(ServiceError::NotRunning(SERVICE_NAME.to_string()));
        }

        self.miner.stop();
        self.chain.set_running(false);
        info!("engine stopped");
        Ok(())
    }
}

impl PrimaryService for EngineService {
    fn miner(&self) -> Arc<dyn MinerControl> {
        self.miner.clone()
    }

    fn chain_height(&self) -> u64 {
        self.chain.height()
    }
}
