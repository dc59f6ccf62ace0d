//! Node configuration loaded from the node and genesis JSON files, plus the
//! `.env` hydration shared by the telemetry knobs.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Address, AddressFormatError};

/// Fully resolved node configuration. Built once at boot and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub name: String,
    pub version: String,
    pub http_addr: String,
    pub engine: EngineConfig,
    pub metrics: MetricsSinkConfig,
}

/// Settings consumed by the primary engine service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub network_id: u64,
    pub coinbase: Address,
    pub genesis: GenesisInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenesisInfo {
    pub difficulty: u64,
    pub shard_number: u32,
    pub timestamp: u64,
    pub accounts: BTreeMap<Address, u128>,
}

/// Connection parameters for the time-series sink fed by the metrics reporter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsSinkConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub interval_secs: u64,
}

impl MetricsSinkConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    pub fn interval(&self) -> Duration {
        if self.interval_secs == 0 {
            Self::DEFAULT_INTERVAL
        } else {
            Duration::from_secs(self.interval_secs)
        }
    }
}

impl Default for MetricsSinkConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "influxdb".to_string(),
            username: "test".to_string(),
            password: "test123".to_string(),
            namespace: String::new(),
            interval_secs: Self::DEFAULT_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeFile {
    basic: BasicSection,
    #[serde(default)]
    p2p: P2pSection,
    #[serde(default)]
    http_server: HttpSection,
    #[serde(default)]
    metrics: MetricsSinkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BasicSection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    data_dir: String,
    #[serde(default)]
    coinbase: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct P2pSection {
    #[serde(rename = "networkID", default)]
    network_id: u64,
}

#[derive(Debug, Default, Deserialize)]
struct HttpSection {
    #[serde(default)]
    address: String,
}

/// Reads and validates the node config and genesis files. Nothing is created
/// on disk; callers decide what to do with the resulting paths.
pub fn load_config(
    node_path: impl AsRef<Path>,
    genesis_path: impl AsRef<Path>,
) -> Result<Config, ConfigError> {
    let node: NodeFile = read_json(node_path.as_ref())?;
    let genesis: GenesisInfo = read_json(genesis_path.as_ref())?;

    let name = require_field(node.basic.name, "basic.name")?;
    let data_dir = require_field(node.basic.data_dir, "basic.dataDir")?;
    let coinbase = match node.basic.coinbase.as_deref().map(str::trim) {
        None | Some("") => Address::zero(),
        Some(raw) => Address::parse(raw).map_err(|source| ConfigError::InvalidAddress {
            value: raw.to_string(),
            source,
        })?,
    };

    Ok(Config {
        data_dir: PathBuf::from(data_dir),
        name,
        version: node.basic.version.trim().to_string(),
        http_addr: node.http_server.address.trim().to_string(),
        engine: EngineConfig {
            network_id: node.p2p.network_id,
            coinbase,
            genesis,
        },
        metrics: node.metrics,
    })
}

fn read_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn require_field(value: String, field: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConfigError::MissingField { field })
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("KEEL_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("invalid address `{value}`: {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: AddressFormatError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
