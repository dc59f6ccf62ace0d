use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use keel_domain::GenesisInfo;
use metrics::{counter, gauge};

/// Chain state shared between the engine and its miner.
#[derive(Debug)]
pub struct ChainState {
    network_id: u64,
    genesis: GenesisInfo,
    height: AtomicU64,
    running: AtomicBool,
}

impl ChainState {
    pub fn new(network_id: u64, genesis: GenesisInfo) -> Self {
        Self {
            network_id,
            genesis,
            height: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn genesis(&self) -> &GenesisInfo {
        &self.genesis
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the previous running state.
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }

    /// Appends one block on top of the current head and returns the new height.
    pub(crate) fn insert_block(&self) -> u64 {
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        counter!("chain_block_insert_total").increment(1);
        gauge!("chain_height").set(height as f64);
        height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserting_blocks_advances_height() {
        let chain = ChainState::new(1, GenesisInfo::default());
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.insert_block(), 1);
        assert_eq!(chain.insert_block(), 2);
        assert_eq!(chain.height(), 2);
    }

    #[test]
    fn running_flag_reports_previous_state() {
        let chain = ChainState::new(1, GenesisInfo::default());
        assert!(!chain.set_running(true));
        assert!(chain.set_running(true));
        assert!(chain.is_running());
    }
}
