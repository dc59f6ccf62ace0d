use std::sync::Arc;

use chrono::{DateTime, Utc};
use keel_domain::{Config, PrimaryService};
use keel_node::NodeHandle;
use serde::Serialize;

/// One observation of the node and its engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub label: String,
    pub name: String,
    pub version: String,
    pub addr: String,
    pub network_id: u64,
    pub coinbase: String,
    pub node_running: bool,
    pub services: Vec<String>,
    pub mining: bool,
    pub chain_height: u64,
    pub captured_at: DateTime<Utc>,
}

/// Everything the monitor needs to build a `NodeStatus`.
#[derive(Clone)]
pub struct StatusProbe {
    label: String,
    network_id: u64,
    coinbase: String,
    primary: Arc<dyn PrimaryService>,
    node: NodeHandle,
}

impl StatusProbe {
    pub fn new(
        label: impl Into<String>,
        config: &Config,
        primary: Arc<dyn PrimaryService>,
        node: NodeHandle,
    ) -> Self {
        Self {
            label: label.into(),
            network_id: config.engine.network_id,
            coinbase: config.engine.coinbase.to_hex(),
            primary,
            node,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capture(&self) -> NodeStatus {
        NodeStatus {
            label: self.label.clone(),
            name: self.node.name().to_string(),
            version: self.node.version().to_string(),
            addr: self.node.http_addr().to_string(),
            network_id: self.network_id,
            coinbase: self.coinbase.clone(),
            node_running: self.node.is_running(),
            services: self.node.service_names(),
            mining: self.primary.miner().is_mining(),
            chain_height: self.primary.chain_height(),
            captured_at: Utc::now(),
        }
    }
}
