use std::{future::Future, path::Path, sync::Arc};

use keel_domain::{
    load_config,
    services::{
        init_telemetry, MetricsReporter, MetricsSwitch, MetricsToggle, ReporterTags,
        TelemetryConfig, TelemetryError,
    },
    ConfigError, MinerError, Service, ServiceContext, ServiceError,
};
use keel_node::{Node, NodeError};
use strum_macros::Display;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{
    cli::{MinerMode, StartArgs},
    components::{DefaultComponents, NodeComponents},
};

pub const MONITOR_LABEL: &str = "node monitor";

/// Boot progress. Each stage is reached only if the previous one did not
/// fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BootStage {
    Init,
    ConfigLoaded,
    NodeConstructed,
    ServicesRegistered,
    NodeStarted,
    MinerEvaluated,
    MetricsEvaluated,
    Blocked,
}

/// Entry point for `keel-node start`.
pub async fn run(args: StartArgs) -> Result<(), BootError> {
    // 1. Telemetry
    // `NODE_` prefixed env vars pick the log filter and log dir. A log dir
    // that cannot be opened only costs the file layer.
    let telemetry_config = TelemetryConfig::from_env("NODE");
    let telemetry = init_telemetry(&telemetry_config)?;

    // 2. Production wiring: real engine and monitor, Prometheus snapshots,
    // InfluxDB pushes.
    let components = DefaultComponents::new(telemetry.clone());

    // 3. Boot sequence, config load through the metrics toggle.
    let mut booted = boot(&args, &components, telemetry.log_dir()).await?;
    info!(
        stage = %booted.stage(),
        services = booted.node().service_count(),
        metrics = booted.metrics().is_enabled(),
        file_logging = telemetry.file_logging(),
        tags = ?booted.tags(),
        "boot complete"
    );

    // 4. Park until Ctrl-C or SIGTERM.
    booted.park(shutdown_signal()).await;
    Ok(())
}

/// A node that made it through boot, plus the metrics toggle it owns.
pub struct Booted {
    stage: BootStage,
    node: Node,
    metrics: MetricsToggle,
    tags: ReporterTags,
}

impl Booted {
    pub fn stage(&self) -> BootStage {
        self.stage
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn metrics(&self) -> &MetricsToggle {
        &self.metrics
    }

    pub fn tags(&self) -> &ReporterTags {
        &self.tags
    }

    /// Blocks until `shutdown` resolves. Services are left to die with the
    /// process; only the metrics reporter is stopped.
    pub async fn park<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        advance(&mut self.stage, BootStage::Blocked);
        shutdown.await;
        info!("termination signal received");
        self.metrics.disable().await;
    }
}

/// Runs the boot sequence up to `MetricsEvaluated`.
pub async fn boot<C>(args: &StartArgs, components: &C, log_dir: &Path) -> Result<Booted, BootError>
where
    C: NodeComponents,
{
    let mut stage = BootStage::Init;

    // 1. Load node + genesis config. Nothing is built or created on failure.
    let config = load_config(&args.config, &args.genesis)?;
    advance(&mut stage, BootStage::ConfigLoaded);
    println!("log folder: {}", log_dir.display());
    println!("data folder: {}", config.data_dir.display());

    // 2. Build the registry; this creates the data dir.
    let mut node = Node::new(config.clone())?;
    advance(&mut stage, BootStage::NodeConstructed);

    // 3. Construct the engine and its monitor. Either failing is fatal.
    let context = ServiceContext::new(config.data_dir.clone());
    let primary = components.engine(context, &config.engine)?;
    let monitor = components.monitor(primary.clone(), node.handle(), &config, MONITOR_LABEL)?;

    // 4. Register in start order. A rejected registration is logged and the
    // next one is still attempted.
    let services: [Arc<dyn Service>; 2] = [primary.clone(), monitor];
    for service in services {
        let name = service.name().to_string();
        if let Err(err) = node.register(service) {
            error!(service = %name, %err, "service registration failed");
        }
    }
    advance(&mut stage, BootStage::ServicesRegistered);

    // 5. Start every registered service once. Failures are logged and do not
    // stop the remaining services.
    match node.start().await {
        Ok(report) if !report.is_clean() => {
            warn!(failed = report.failed.len(), "node started with failed services");
        }
        Ok(_) => {}
        Err(err) => error!(%err, "node start failed"),
    }
    advance(&mut stage, BootStage::NodeStarted);

    // 6. Miner. Only a case-insensitive `start` starts it; a start error
    // ends boot without touching the running services.
    if MinerMode::parse(&args.miner) == MinerMode::Start {
        primary.miner().start().map_err(BootError::Miner)?;
    } else {
        info!(miner = %args.miner, "miner left inactive");
    }
    advance(&mut stage, BootStage::MinerEvaluated);

    // 7. Metrics toggle. Tags are frozen here; a sink that cannot be built
    // leaves metrics off.
    let tags = ReporterTags::from_config(&config);
    let mut metrics = MetricsToggle::new(MetricsSwitch::default());
    if args.metrics {
        match components.metrics_sink(&config.metrics) {
            Ok(sink) => {
                metrics.enable(MetricsReporter::new(
                    components.metrics_source(),
                    sink,
                    config.metrics.interval(),
                    tags.clone(),
                ));
                println!("start metrics");
            }
            Err(err) => {
                error!(%err, "metrics sink unavailable, metrics stay disabled");
                metrics.disable().await;
            }
        }
    } else {
        metrics.disable().await;
    }
    advance(&mut stage, BootStage::MetricsEvaluated);

    Ok(Booted {
        stage,
        node,
        metrics,
        tags,
    })
}

fn advance(stage: &mut BootStage, next: BootStage) {
    info!(from = %stage, to = %next, "boot stage");
    *stage = next;
}

/// Resolves on Ctrl-C or SIGTERM. If no signal can be installed it never
/// resolves and the process runs until killed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(%err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("reading the config file failed: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("cannot construct service: {0}")]
    Service(#[from] ServiceError),
    #[error("Starting the miner failed: {0}")]
    Miner(MinerError),
}
