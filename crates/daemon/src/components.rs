use std::sync::Arc;

use keel_domain::{
    services::{InfluxSink, MetricsSink, MetricsSource, ReporterError, TelemetryGuard},
    Config, EngineConfig, MetricsSinkConfig, PrimaryService, Service, ServiceContext,
    ServiceError,
};
use keel_engine::EngineService;
use keel_monitor::MonitorService;
use keel_node::NodeHandle;

/// Constructors for everything the boot sequence wires together.
pub trait NodeComponents {
    fn engine(
        &self,
        context: ServiceContext,
        config: &EngineConfig,
    ) -> Result<Arc<dyn PrimaryService>, ServiceError>;

    fn monitor(
        &self,
        primary: Arc<dyn PrimaryService>,
        node: NodeHandle,
        config: &Config,
        label: &str,
    ) -> Result<Arc<dyn Service>, ServiceError>;

    fn metrics_source(&self) -> Arc<dyn MetricsSource>;

    fn metrics_sink(&self, config: &MetricsSinkConfig) -> Result<Arc<dyn MetricsSink>, ReporterError>;
}

/// Production wiring: the real engine and monitor, snapshots from the local
/// Prometheus recorder, pushes to InfluxDB.
pub struct DefaultComponents {
    telemetry: TelemetryGuard,
}

impl DefaultComponents {
    pub fn new(telemetry: TelemetryGuard) -> Self {
        Self { telemetry }
    }
}

impl NodeComponents for DefaultComponents {
    fn engine(
        &self,
        context: ServiceContext,
        config: &EngineConfig,
    ) -> Result<Arc<dyn PrimaryService>, ServiceError> {
        Ok(Arc::new(EngineService::new(context, config)?))
    }

    fn monitor(
        &self,
        primary: Arc<dyn PrimaryService>,
        node: NodeHandle,
        config: &Config,
        label: &str,
    ) -> Result<Arc<dyn Service>, ServiceError> {
        Ok(Arc::new(MonitorService::new(primary, node, config, label)?))
    }

    fn metrics_source(&self) -> Arc<dyn MetricsSource> {
        Arc::new(self.telemetry.clone())
    }

    fn metrics_sink(&self, config: &MetricsSinkConfig) -> Result<Arc<dyn MetricsSink>, ReporterError> {
        Ok(Arc::new(InfluxSink::new(config)?))
    }
}
