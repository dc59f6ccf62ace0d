use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};

use super::{
    reporter::{MetricsSink, ReporterError, ReporterTags},
    snapshot::{encode_line_protocol, MetricSample},
};
use crate::config::MetricsSinkConfig;

/// Upper bound for one write, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// InfluxDB 1.x write endpoint fed with line protocol.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    namespace: String,
}

impl InfluxSink {
    pub fn new(config: &MetricsSinkConfig) -> Result<Self, ReporterError> {
        Self::with_timeout(config, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        config: &MetricsSinkConfig,
        timeout: Duration,
    ) -> Result<Self, ReporterError> {
        let base = config.url.trim().trim_end_matches('/');
        let mut write_url = Url::parse(&format!("{base}/write"))
            .map_err(|err| ReporterError::InvalidUrl(config.url.clone(), err.to_string()))?;

        {
            let mut query = write_url.query_pairs_mut();
            query.append_pair("db", &config.database);
            if !config.username.is_empty() {
                query.append_pair("u", &config.username);
            }
            if !config.password.is_empty() {
                query.append_pair("p", &config.password);
            }
            query.append_pair("precision", "s");
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            write_url,
            namespace: config.namespace.clone(),
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn push(
        &self,
        samples: &[MetricSample],
        tags: &ReporterTags,
    ) -> Result<(), ReporterError> {
        if samples.is_empty() {
            return Ok(());
        }

        let body = encode_line_protocol(samples, &self.namespace, tags, Utc::now().timestamp());
        let response = self
            .client
            .post(self.write_url.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReporterError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_write_url_from_defaults() {
        let sink = InfluxSink::new(&MetricsSinkConfig::default()).expect("sink builds");
        assert_eq!(
            sink.write_url().as_str(),
            "http://localhost:8086/write?db=influxdb&u=test&p=test123&precision=s"
        );
    }

    #[test]
    fn omits_empty_credentials_and_trailing_slash() {
        let config = MetricsSinkConfig {
            url: "https://metrics.example.com/influx/".to_string(),
            username: String::new(),
            password: String::new(),
            ..MetricsSinkConfig::default()
        };
        let sink = InfluxSink::new(&config).expect("sink builds");
        assert_eq!(
            sink.write_url().as_str(),
            "https://metrics.example.com/influx/write?db=influxdb&precision=s"
        );
    }

    #[test]
    fn rejects_unparseable_url() {
        let config = MetricsSinkConfig {
            url: "not a url".to_string(),
            ..MetricsSinkConfig::default()
        };
        assert!(matches!(
            InfluxSink::new(&config),
            Err(ReporterError::InvalidUrl(..))
        ));
    }

    #[tokio::test]
    async fn empty_snapshot_is_not_sent() {
        let config = MetricsSinkConfig {
            url: "http://127.0.0.1:9".to_string(),
            ..MetricsSinkConfig::default()
        };
        let sink = InfluxSink::new(&config).expect("sink builds");
        sink.push(&[], &ReporterTags::default())
            .await
            .expect("nothing to push");
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        // Accepted by the kernel backlog, never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let config = MetricsSinkConfig {
            url: format!("http://{}", listener.local_addr().unwrap()),
            ..MetricsSinkConfig::default()
        };
        let sink =
            InfluxSink::with_timeout(&config, Duration::from_millis(200)).expect("sink builds");
        let samples = crate::services::parse_exposition("chain_block_insert_total 1");

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            sink.push(&samples, &ReporterTags::default()),
        )
        .await
        .expect("push gives up on its own")
        .unwrap_err();
        assert!(matches!(err, ReporterError::Http(ref source) if source.is_timeout()));
        drop(listener);
    }
}
