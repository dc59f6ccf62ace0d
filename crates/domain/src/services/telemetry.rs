use std::{
    env,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

/// Set once the subscriber is installed; the value says whether the file
/// layer made it in.
static SUBSCRIBER_INSTALLED: OnceCell<bool> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

const LOG_FILE_NAME: &str = "node.log";

/// Shared observability options for binaries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    log_dir: PathBuf,
}

impl TelemetryConfig {
    /// Loads telemetry knobs from optional environment variables prefixed with
    /// `<PREFIX>_`, e.g. `NODE_LOG_FILTER`. Missing entries fall back to
    /// defaults so the daemon boots without extra configuration.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();
        let log_key = format!("{}_LOG_FILTER", upper);
        let dir_key = format!("{}_LOG_DIR", upper);

        let log_filter = env::var(log_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let log_dir = env::var(dir_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| PathBuf::from(value.trim()))
            .unwrap_or_else(default_log_dir);

        Self {
            log_filter,
            log_dir,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

fn default_log_dir() -> PathBuf {
    env::temp_dir().join("keel").join("log")
}

/// Guard returned after telemetry initialization.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
    log_dir: PathBuf,
    file_logging: bool,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// False when the log file could not be opened and only stdout is used.
    pub fn file_logging(&self) -> bool {
        self.file_logging
    }
}

/// Centralized helper to wire up tracing + the metrics recorder once per process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let file_logging = install_tracing(config)?;
    let metrics = install_metrics()?;

    Ok(TelemetryGuard {
        metrics,
        log_dir: config.log_dir().to_path_buf(),
        file_logging,
    })
}

/// Returns whether the file layer is active. An unusable log dir degrades to
/// stdout-only logging instead of failing.
fn install_tracing(config: &TelemetryConfig) -> Result<bool, TelemetryError> {
    if let Some(file_logging) = SUBSCRIBER_INSTALLED.get() {
        return Ok(*file_logging);
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;
    let (file_layer, file_error) = match open_log_file(config.log_dir()) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };
    let file_logging = file_layer.is_some();

    if SUBSCRIBER_INSTALLED.set(file_logging).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .with(file_layer)
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;

        if let Some(err) = file_error {
            warn!(%err, "file logging disabled, logging to stdout only");
        }
    }

    Ok(SUBSCRIBER_INSTALLED.get().copied().unwrap_or(file_logging))
}

fn open_log_file(dir: &Path) -> Result<File, TelemetryError> {
    fs::create_dir_all(dir)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))
        })
        .map_err(|err| TelemetryError::LogFile {
            dir: dir.to_path_buf(),
            reason: err.to_string(),
        })
}

fn install_metrics() -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map(Arc::new)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))
        })
        .cloned()
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("cannot open log file in `{}`: {reason}", .dir.display())]
    LogFile { dir: PathBuf, reason: String },
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn telemetry_config_uses_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("KEEL_SKIP_DOTENV", "1");
        env::remove_var("NODE_LOG_FILTER");
        env::remove_var("NODE_LOG_DIR");

        let cfg = TelemetryConfig::from_env("node");
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.log_dir(), default_log_dir().as_path());
    }

    #[test]
    fn telemetry_config_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("KEEL_SKIP_DOTENV", "1");
        env::set_var("NODE_LOG_FILTER", "debug");
        env::set_var("NODE_LOG_DIR", " /var/log/keel ");
        let cfg = TelemetryConfig::from_env("NODE");
        assert_eq!(cfg.log_filter(), "debug");
        assert_eq!(cfg.log_dir(), Path::new("/var/log/keel"));
        env::remove_var("NODE_LOG_FILTER");
        env::remove_var("NODE_LOG_DIR");
    }

    #[test]
    fn empty_log_filter_is_treated_as_default() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("KEEL_SKIP_DOTENV", "1");
        env::set_var("NODE_LOG_FILTER", "  ");
        let cfg = TelemetryConfig::from_env("NODE");
        assert_eq!(cfg.log_filter(), "info");
        env::remove_var("NODE_LOG_FILTER");
    }

    #[test]
    fn log_file_is_created_inside_missing_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        open_log_file(&nested).expect("log file opens");
        assert!(nested.join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn unusable_log_dir_falls_back_to_stdout() {
        let blocker = tempfile::NamedTempFile::new().expect("temp file");
        let config = TelemetryConfig {
            log_filter: "info".to_string(),
            log_dir: blocker.path().join("log"),
        };

        let guard = init_telemetry(&config).expect("telemetry still initializes");
        assert!(!guard.file_logging());
        assert_eq!(guard.log_dir(), config.log_dir());
    }
}
