//! Metrics switch and the periodic reporter that pushes registry snapshots to
//! the time-series sink.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{
    snapshot::{parse_exposition, MetricSample},
    telemetry::TelemetryGuard,
};
use crate::config::Config;

/// Process-wide metrics toggle. Cloned into every reader instead of living in
/// a global.
#[derive(Debug, Clone, Default)]
pub struct MetricsSwitch(Arc<AtomicBool>);

impl MetricsSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tags attached to every pushed series. Frozen once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReporterTags(BTreeMap<String, String>);

impl ReporterTags {
    pub fn from_config(config: &Config) -> Self {
        Self::from_pairs([
            ("coinBase", config.engine.coinbase.to_hex()),
            ("networkId", config.engine.network_id.to_string()),
            ("name", config.name.clone()),
            ("version", config.version.clone()),
            ("addr", config.http_addr.clone()),
        ])
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Where snapshots come from.
pub trait MetricsSource: Send + Sync {
    fn snapshot(&self) -> Vec<MetricSample>;
}

impl MetricsSource for TelemetryGuard {
    fn snapshot(&self) -> Vec<MetricSample> {
        parse_exposition(&self.render_metrics())
    }
}

/// Where snapshots go.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn push(&self, samples: &[MetricSample], tags: &ReporterTags)
        -> Result<(), ReporterError>;
}

/// Pushes a snapshot every `interval`, the first one after a full interval.
pub struct MetricsReporter {
    source: Arc<dyn MetricsSource>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    tags: ReporterTags,
}

impl MetricsReporter {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
        tags: ReporterTags,
    ) -> Self {
        Self {
            source,
            sink,
            interval,
            tags,
        }
    }

    pub fn tags(&self) -> &ReporterTags {
        &self.tags
    }

    /// Spawns the reporter loop. Pushes are skipped while `switch` is off.
    pub fn spawn(self, switch: MetricsSwitch) -> ReporterHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let tags = self.tags.clone();
        let task = tokio::spawn(self.run(switch, stop_rx));
        ReporterHandle {
            stop: stop_tx,
            task,
            tags,
        }
    }

    async fn run(self, switch: MetricsSwitch, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_requested(&mut stop) => break,
            }

            // A push in flight must not hold up a stop request.
            tokio::select! {
                _ = self.report_once(&switch) => {}
                _ = stop_requested(&mut stop) => {
                    debug!("metrics push cancelled by stop request");
                    break;
                }
            }
        }

        debug!("metrics reporter stopped");
    }

    async fn report_once(&self, switch: &MetricsSwitch) {
        if !switch.is_enabled() {
            return;
        }

        let samples = self.source.snapshot();
        match self.sink.push(&samples, &self.tags).await {
            Ok(()) => {
                counter!("metrics_reporter_pushes_total", "result" => "ok").increment(1);
            }
            Err(err) => {
                counter!("metrics_reporter_pushes_total", "result" => "error").increment(1);
                warn!(?err, "metrics push failed");
            }
        }
    }
}

/// Resolves once `true` is sent or the sender is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Owned handle to a running reporter.
pub struct ReporterHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    tags: ReporterTags,
}

impl ReporterHandle {
    pub fn tags(&self) -> &ReporterTags {
        &self.tags
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the loop and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(?err, "metrics reporter ended abnormally");
        }
    }
}

/// Applies the boot-time metrics flag: flips the switch and owns the reporter
/// it may have started.
pub struct MetricsToggle {
    switch: MetricsSwitch,
    reporter: Option<ReporterHandle>,
}

impl MetricsToggle {
    pub fn new(switch: MetricsSwitch) -> Self {
        Self {
            switch,
            reporter: None,
        }
    }

    /// Turns metrics on and starts `reporter` unless one is already running.
    /// Returns without waiting for the first push.
    pub fn enable(&mut self, reporter: MetricsReporter) {
        self.switch.set(true);
        if self.reporter.is_some() {
            debug!("metrics reporter already running");
            return;
        }
        self.reporter = Some(reporter.spawn(self.switch.clone()));
        info!("metrics reporter started");
    }

    /// Turns metrics off and stops the reporter if there is one.
    pub async fn disable(&mut self) {
        self.switch.set(false);
        if let Some(reporter) = self.reporter.take() {
            reporter.stop().await;
            info!("metrics reporter stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    pub fn is_reporting(&self) -> bool {
        self.reporter.is_some()
    }

    pub fn reporter_tags(&self) -> Option<&ReporterTags> {
        self.reporter.as_ref().map(ReporterHandle::tags)
    }

    pub fn switch(&self) -> &MetricsSwitch {
        &self.switch
    }
}

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("invalid sink url `{0}`: {1}")]
    InvalidUrl(String, String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sink rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, GenesisInfo, MetricsSinkConfig};
    use crate::model::Address;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        pushes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MetricsSink for CountingSink {
        async fn push(
            &self,
            _samples: &[MetricSample],
            _tags: &ReporterTags,
        ) -> Result<(), ReporterError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ReporterError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct HangingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MetricsSink for HangingSink {
        async fn push(
            &self,
            _samples: &[MetricSample],
            _tags: &ReporterTags,
        ) -> Result<(), ReporterError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct StaticSource;

    impl MetricsSource for StaticSource {
        fn snapshot(&self) -> Vec<MetricSample> {
            parse_exposition("chain_block_insert_total 1")
        }
    }

    fn reporter(sink: Arc<CountingSink>) -> MetricsReporter {
        MetricsReporter::new(
            Arc::new(StaticSource),
            sink,
            Duration::from_secs(10),
            ReporterTags::from_pairs([("name", "n1")]),
        )
    }

    fn sample_config() -> Config {
        Config {
            data_dir: PathBuf::from("/tmp/x"),
            name: "n1".to_string(),
            version: "v1".to_string(),
            http_addr: "127.0.0.1:8080".to_string(),
            engine: EngineConfig {
                network_id: 1,
                coinbase: Address::parse("0xabc").unwrap(),
                genesis: GenesisInfo::default(),
            },
            metrics: MetricsSinkConfig::default(),
        }
    }

    #[test]
    fn tags_are_derived_from_config() {
        let tags = ReporterTags::from_config(&sample_config());
        let expected = ReporterTags::from_pairs([
            ("coinBase", "0xabc"),
            ("networkId", "1"),
            ("name", "n1"),
            ("version", "v1"),
            ("addr", "127.0.0.1:8080"),
        ]);
        assert_eq!(tags, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_reporter_pushes_after_one_interval() {
        let sink = Arc::new(CountingSink::default());
        let mut toggle = MetricsToggle::new(MetricsSwitch::default());

        toggle.enable(reporter(sink.clone()));
        assert!(toggle.is_enabled());
        assert!(toggle.is_reporting());
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_a_running_reporter() {
        let sink = Arc::new(CountingSink::default());
        let mut toggle = MetricsToggle::new(MetricsSwitch::default());
        toggle.enable(reporter(sink.clone()));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);

        toggle.disable().await;
        assert!(!toggle.is_enabled());
        assert!(!toggle.is_reporting());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disable_without_reporter_is_a_no_op() {
        let mut toggle = MetricsToggle::new(MetricsSwitch::new(true));
        toggle.disable().await;
        toggle.disable().await;
        assert!(!toggle.is_enabled());
        assert!(!toggle.is_reporting());
    }

    #[tokio::test(start_paused = true)]
    async fn switched_off_reporter_never_pushes() {
        let sink = Arc::new(CountingSink::default());
        let handle = reporter(sink.clone()).spawn(MetricsSwitch::new(false));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 0);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn push_failures_do_not_stop_the_loop() {
        let sink = Arc::new(CountingSink {
            pushes: AtomicUsize::new(0),
            fail: true,
        });
        let handle = reporter(sink.clone()).spawn(MetricsSwitch::new(true));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 3);
        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_enable_keeps_the_first_reporter() {
        let sink = Arc::new(CountingSink::default());
        let mut toggle = MetricsToggle::new(MetricsSwitch::default());
        toggle.enable(reporter(sink.clone()));
        toggle.enable(reporter(sink.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);
        assert_eq!(toggle.reporter_tags().and_then(|t| t.get("name")), Some("n1"));
        toggle.disable().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disable_returns_while_a_push_hangs() {
        let sink = Arc::new(HangingSink::default());
        let mut toggle = MetricsToggle::new(MetricsSwitch::default());
        toggle.enable(MetricsReporter::new(
            Arc::new(StaticSource),
            sink.clone(),
            Duration::from_secs(10),
            ReporterTags::default(),
        ));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(1), toggle.disable())
            .await
            .expect("disable must not wait for the stuck push");
        assert!(!toggle.is_reporting());
        assert!(!toggle.is_enabled());
    }
}
