//! Delivery of a poll's metrics to the platform collector.
//!
//! One batch per poll, one attempt per batch. A failed send is logged by the
//! caller and the metrics of that interval are lost; baselines are not rolled
//! back.

use crate::config::Settings;
use crate::poller::QueryContext;
use anyhow::{Context, Result, anyhow, bail};
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

mod payload;

pub use payload::{AgentData, ComponentData, PlatformData};

pub const LICENSE_KEY_HEADER: &str = "X-License-Key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub trait Sink: Send + Sync {
    fn send<'a>(&'a self, contexts: &'a [QueryContext]) -> BoxFuture<'a, Result<()>>;
}

/// Posts batches as JSON to the platform metrics API.
pub struct PlatformSink {
    client: reqwest::Client,
    endpoint: Url,
    license_key: Option<SecretString>,
    agent: AgentData,
    collect_only: bool,
}

impl PlatformSink {
    pub fn new(settings: &Settings) -> Result<Self> {
        let endpoint = Url::parse(&settings.collector_endpoint)
            .with_context(|| format!("invalid collector endpoint {}", settings.collector_endpoint))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            license_key: settings
                .license_key
                .as_ref()
                .map(|key| SecretString::from(key.expose_secret())),
            agent: AgentData::current(),
            collect_only: settings.collect_only,
        })
    }

    pub fn is_collect_only(&self) -> bool {
        self.collect_only
    }

    /// Merge the contexts of one poll into a single request body.
    pub fn payload(&self, contexts: &[QueryContext]) -> PlatformData {
        let mut data = PlatformData::new(self.agent.clone());
        for context in contexts {
            data.add_component(&context.component);
        }
        data
    }

    #[instrument(skip_all, name = "sink.send", fields(collect_only = self.collect_only))]
    async fn post(&self, contexts: &[QueryContext]) -> Result<()> {
        let payload = self.payload(contexts);

        if self.collect_only {
            info!(
                components = payload.components.len(),
                metrics = payload.metric_count(),
                "collect-only mode, not sending metrics"
            );
            debug!(
                target: "verbose_sql",
                "{}",
                serde_json::to_string(&payload).unwrap_or_default()
            );
            return Ok(());
        }

        let license_key = self
            .license_key
            .as_ref()
            .ok_or_else(|| anyhow!("license key is required to send metrics"))?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(LICENSE_KEY_HEADER, license_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to send metrics to {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("collector rejected metrics with status {status}: {body}");
        }

        debug!(
            status = status.as_u16(),
            components = payload.components.len(),
            metrics = payload.metric_count(),
            "metrics sent"
        );

        Ok(())
    }
}

impl Sink for PlatformSink {
    fn send<'a>(&'a self, contexts: &'a [QueryContext]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.post(contexts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{Row, Sample};

    fn context(target: &str, value: f64) -> QueryContext {
        QueryContext::new(
            "connections",
            vec![Row::Sample(
                Sample::new("Connections").with("Count", "connections", value),
            )],
            ComponentData::new(target, "guid", Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_new_rejects_bad_endpoint() {
        let settings = Settings {
            collector_endpoint: "not a url".to_string(),
            ..Settings::default()
        };
        assert!(PlatformSink::new(&settings).is_err());
    }

    #[test]
    fn test_payload_groups_by_component() {
        let sink = PlatformSink::new(&Settings::default()).expect("sink");
        let payload = sink.payload(&[context("A", 1.0), context("B", 2.0), context("A", 3.0)]);

        assert_eq!(payload.components.len(), 2);
        assert_eq!(payload.agent.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_collect_only_does_not_send() {
        let settings = Settings {
            collect_only: true,
            // nothing listens here
            collector_endpoint: "http://127.0.0.1:1/metrics".to_string(),
            ..Settings::default()
        };
        let sink = PlatformSink::new(&settings).expect("sink");

        assert!(sink.is_collect_only());
        assert!(sink.send(&[context("A", 1.0)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_without_license_key_fails() {
        let sink = PlatformSink::new(&Settings::default()).expect("sink");
        assert!(sink.send(&[context("A", 1.0)]).await.is_err());
    }
}
