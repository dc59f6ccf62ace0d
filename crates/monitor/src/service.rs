use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use keel_domain::{Config, PrimaryService, Service, ServiceError};
use keel_node::NodeHandle;
use tokio::sync::watch;
use tracing::info;

use crate::{
    status::{NodeStatus, StatusProbe},
    worker::run_monitor,
};

const SERVICE_NAME: &str = "monitor";

/// Observability companion of the engine. Polls the engine and the node on
/// a fixed cadence once started.
pub struct MonitorService {
    probe: StatusProbe,
    poll_interval: Duration,
    latest: Arc<RwLock<Option<NodeStatus>>>,
    worker: Mutex<Option<watch::Sender<bool>>>,
}

impl MonitorService {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(
        primary: Arc<dyn PrimaryService>,
        node: NodeHandle,
        config: &Config,
        label: &str,
    ) -> Result<Self, ServiceError> {
        Self::with_poll_interval(primary, node, config, label, Self::DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        primary: Arc<dyn PrimaryService>,
        node: NodeHandle,
        config: &Config,
        label: &str,
        poll_interval: Duration,
    ) -> Result<Self, ServiceError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ServiceError::InvalidSetup(
                "monitor label must not be empty".to_string(),
            ));
        }
        if poll_interval.is_zero() {
            return Err(ServiceError::InvalidSetup(
                "poll interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            probe: StatusProbe::new(label, config, primary, node),
            poll_interval,
            latest: Arc::new(RwLock::new(None)),
            worker: Mutex::new(None),
        })
    }

    pub fn label(&self) -> &str {
        self.probe.label()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().expect("mutex poisoned").is_some()
    }

    /// Last sample taken by the worker, if any.
    pub fn latest_status(&self) -> Option<NodeStatus> {
        self.latest.read().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl Service for MonitorService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let mut worker = self.worker.lock().expect("mutex poisoned");
        if worker.is_some() {
            return Err(ServiceError::AlreadyRunning(SERVICE_NAME.to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_monitor(
            self.probe.clone(),
            Arc::clone(&self.latest),
            self.poll_interval,
            stop_rx,
        ));
        *worker = Some(stop_tx);
        info!(label = self.label(), interval = ?self.poll_interval, "monitor started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        let sender = self.worker.lock().expect("mutex poisoned").take();
        match sender {
            Some(sender) => {
                let _ = sender.send(true);
                info!(label = self.label(), "monitor stopped");
                Ok(())
            }
            None => Err(ServiceError::NotRunning(SERVICE_NAME.to_string())),
        }
    }
}
