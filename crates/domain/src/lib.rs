//! Building blocks shared by the node, its hosted services and the daemon
//! binary: configuration, lifecycle capabilities and telemetry.

pub mod config;
pub mod model;
pub mod service;
pub mod services;

pub use config::{load_config, Config, ConfigError, EngineConfig, GenesisInfo, MetricsSinkConfig};
pub use model::{Address, AddressFormatError, ServiceContext};
pub use service::{MinerControl, MinerError, PrimaryService, Service, ServiceError};
