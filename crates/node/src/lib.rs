//! Service registry that owns the node configuration and starts every
//! registered service in registration order.

use std::{
    fs, io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use keel_domain::{Config, Service};
use metrics::{counter, gauge};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("data dir must not be empty")]
    EmptyDataDir,
    #[error("cannot prepare data dir `{}`: {source}", .path.display())]
    DataDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("node is already running")]
    AlreadyRunning,
    #[error("service `{0}` is already registered")]
    DuplicateService(String),
}

struct NodeShared {
    name: String,
    version: String,
    http_addr: String,
    running: AtomicBool,
    service_names: RwLock<Vec<String>>,
}

/// Read-only view of a node handed to services that need to observe it.
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<NodeShared>,
}

impl NodeHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn version(&self) -> &str {
        &self.shared.version
    }

    pub fn http_addr(&self) -> &str {
        &self.shared.http_addr
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.shared
            .service_names
            .read()
            .map(|names| names.clone())
            .unwrap_or_default()
    }
}

/// A service whose `start` returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartFailure {
    pub service: String,
    pub error: String,
}

/// Outcome of one `Node::start` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub started: Vec<String>,
    pub failed: Vec<StartFailure>,
}

impl StartReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Node {
    config: Arc<Config>,
    services: Vec<Arc<dyn Service>>,
    shared: Arc<NodeShared>,
}

impl Node {
    /// Builds a node and makes sure its data dir exists.
    pub fn new(config: Config) -> Result<Self, NodeError> {
        if config.data_dir.as_os_str().is_empty() {
            return Err(NodeError::EmptyDataDir);
        }
        fs::create_dir_all(&config.data_dir).map_err(|source| NodeError::DataDir {
            path: config.data_dir.clone(),
            source,
        })?;

        let shared = Arc::new(NodeShared {
            name: config.name.clone(),
            version: config.version.clone(),
            http_addr: config.http_addr.clone(),
            running: AtomicBool::new(false),
            service_names: RwLock::new(Vec::new()),
        });

        Ok(Self {
            config: Arc::new(config),
            services: Vec::new(),
            shared,
        })
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Appends a service. Registration order is start order.
    pub fn register(&mut self, service: Arc<dyn Service>) -> Result<(), NodeError> {
        if self.is_running() {
            return Err(NodeError::AlreadyRunning);
        }

        let name = service.name().to_string();
        if self.services.iter().any(|existing| existing.name() == name) {
            return Err(NodeError::DuplicateService(name));
        }

        if let Ok(mut names) = self.shared.service_names.write() {
            names.push(name.clone());
        }
        self.services.push(service);
        gauge!("node_services_registered").set(self.services.len() as f64);
        info!(service = %name, "service registered");
        Ok(())
    }

    /// Starts every service once, sequentially. A failing service is logged
    /// and recorded; the remaining services are still started and nothing is
    /// rolled back.
    pub async fn start(&self) -> Result<StartReport, NodeError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyRunning);
        }

        let mut report = StartReport::default();
        for service in &self.services {
            let name = service.name().to_string();
            match service.start().await {
                Ok(()) => {
                    counter!("node_service_starts_total", "result" => "ok").increment(1);
                    info!(service = %name, "service started");
                    report.started.push(name);
                }
                Err(err) => {
                    counter!("node_service_starts_total", "result" => "error").increment(1);
                    error!(service = %name, %err, "service failed to start");
                    report.failed.push(StartFailure {
                        service: name,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            node = %self.config.name,
            started = report.started.len(),
            failed = report.failed.len(),
            "node started"
        );
        Ok(report)
    }
}
