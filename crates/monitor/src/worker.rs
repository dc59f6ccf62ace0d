use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use metrics::{counter, gauge};
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::debug;

use crate::status::{NodeStatus, StatusProbe};

/// Samples immediately, then every `poll_interval` until told to stop.
pub(crate) async fn run_monitor(
    probe: StatusProbe,
    latest: Arc<RwLock<Option<NodeStatus>>>,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = probe.capture();
                record_status(&status);
                if let Ok(mut slot) = latest.write() {
                    *slot = Some(status);
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    debug!(label = probe.label(), "monitor worker stopped");
}

fn record_status(status: &NodeStatus) {
    counter!("monitor_polls_total").increment(1);
    gauge!("monitor_chain_height").set(status.chain_height as f64);
    gauge!("monitor_mining").set(if status.mining { 1.0 } else { 0.0 });
    debug!(
        label = %status.label,
        height = status.chain_height,
        mining = status.mining,
        node_running = status.node_running,
        "node status sampled"
    );
}
