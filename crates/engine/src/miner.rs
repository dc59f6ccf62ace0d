use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use keel_domain::{Address, MinerControl, MinerError};
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::chain::ChainState;

/// Seals a block on the shared chain every `block_interval` while running.
pub struct Miner {
    coinbase: Address,
    chain: Arc<ChainState>,
    block_interval: Duration,
    worker: Mutex<Option<watch::Sender<bool>>>,
}

impl Miner {
    pub fn new(coinbase: Address, chain: Arc<ChainState>, block_interval: Duration) -> Self {
        Self {
            coinbase,
            chain,
            block_interval,
            worker: Mutex::new(None),
        }
    }
}

impl MinerControl for Miner {
    fn start(&self) -> Result<(), MinerError> {
        if self.coinbase.is_zero() {
            return Err(MinerError::MissingCoinbase);
        }
        if !self.chain.is_running() {
            return Err(MinerError::EngineStopped);
        }

        let mut worker = self.worker.lock().expect("mutex poisoned");
        if worker.is_some() {
            return Err(MinerError::AlreadyMining);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(seal_blocks(
            Arc::clone(&self.chain),
            self.coinbase.clone(),
            self.block_interval,
            stop_rx,
        ));
        *worker = Some(stop_tx);
        info!(coinbase = %self.coinbase, "miner started");
        Ok(())
    }

    fn stop(&self) {
        let sender = self.worker.lock().expect("mutex poisoned").take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
            info!("miner stopped");
        }
    }

    fn is_mining(&self) -> bool {
        self.worker.lock().expect("mutex poisoned").is_some()
    }
}

async fn seal_blocks(
    chain: Arc<ChainState>,
    coinbase: Address,
    block_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + block_interval, block_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !chain.is_running() {
                    warn!("engine stopped underneath the miner");
                    break;
                }
                let height = chain.insert_block();
                debug!(height, %coinbase, "sealed block");
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}
