use anyhow::Result;
use chrono::Utc;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::warn;

/// Self-monitoring metrics of the agent.
///
/// # Metrics Exported
///
/// - `mssql_agent_polls_total` (Counter): polls completed since start
/// - `mssql_agent_poll_duration_seconds` (Histogram): wall time of a poll,
///   from the first connection to the sink returning
/// - `mssql_agent_target_failures_total{target}` (Counter): polls in which a
///   target contributed nothing (connection failure, panic)
/// - `mssql_agent_query_failures_total{target, query}` (Counter)
/// - `mssql_agent_sink_failures_total` (Counter): batches the collector did
///   not accept
/// - `mssql_agent_metrics_recorded` (Gauge): metrics recorded by the last poll
/// - `mssql_agent_last_poll_timestamp_seconds` (Gauge)
///
/// Handles are cheap to clone and share one registry.
#[derive(Clone)]
pub struct AgentMetrics {
    registry: Registry,

    polls_total: IntCounter,
    poll_duration_seconds: Histogram,
    target_failures_total: IntCounterVec,
    query_failures_total: IntCounterVec,
    sink_failures_total: IntCounter,
    metrics_recorded: IntGauge,
    last_poll_timestamp: Gauge,

    /// Status reported by `/health`.
    ///
    /// A panic while holding the write lock poisons it; readers and writers
    /// recover the inner value with `into_inner()` so status keeps updating.
    state: Arc<RwLock<AgentState>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentState {
    pub running: bool,
    pub polls: u64,
    /// Unix timestamp of the last completed poll.
    pub last_poll: Option<i64>,
    pub last_poll_metrics: usize,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// # Panics
    ///
    /// Panics if metric creation fails (only possible with invalid static names)
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let polls_total = IntCounter::new("mssql_agent_polls_total", "Total number of polls")
            .expect("mssql_agent_polls_total");

        let poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mssql_agent_poll_duration_seconds",
                "Time spent polling all targets in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .expect("mssql_agent_poll_duration_seconds");

        let target_failures_total = IntCounterVec::new(
            Opts::new(
                "mssql_agent_target_failures_total",
                "Total number of failed polls per target",
            ),
            &["target"],
        )
        .expect("mssql_agent_target_failures_total");

        let query_failures_total = IntCounterVec::new(
            Opts::new(
                "mssql_agent_query_failures_total",
                "Total number of failed queries per target",
            ),
            &["target", "query"],
        )
        .expect("mssql_agent_query_failures_total");

        let sink_failures_total = IntCounter::new(
            "mssql_agent_sink_failures_total",
            "Total number of batches the collector did not accept",
        )
        .expect("mssql_agent_sink_failures_total");

        let metrics_recorded = IntGauge::new(
            "mssql_agent_metrics_recorded",
            "Number of metrics recorded by the last poll",
        )
        .expect("mssql_agent_metrics_recorded");

        let last_poll_timestamp = Gauge::new(
            "mssql_agent_last_poll_timestamp_seconds",
            "Unix timestamp of the last completed poll",
        )
        .expect("mssql_agent_last_poll_timestamp_seconds");

        let registry = Registry::new();
        registry
            .register(Box::new(polls_total.clone()))
            .expect("register polls_total");
        registry
            .register(Box::new(poll_duration_seconds.clone()))
            .expect("register poll_duration_seconds");
        registry
            .register(Box::new(target_failures_total.clone()))
            .expect("register target_failures_total");
        registry
            .register(Box::new(query_failures_total.clone()))
            .expect("register query_failures_total");
        registry
            .register(Box::new(sink_failures_total.clone()))
            .expect("register sink_failures_total");
        registry
            .register(Box::new(metrics_recorded.clone()))
            .expect("register metrics_recorded");
        registry
            .register(Box::new(last_poll_timestamp.clone()))
            .expect("register last_poll_timestamp");

        Self {
            registry,
            polls_total,
            poll_duration_seconds,
            target_failures_total,
            query_failures_total,
            sink_failures_total,
            metrics_recorded,
            last_poll_timestamp,
            state: Arc::new(RwLock::new(AgentState::default())),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_poll(&self, duration: Duration, metrics_recorded: usize) {
        let now = Utc::now().timestamp();

        self.polls_total.inc();
        self.poll_duration_seconds.observe(duration.as_secs_f64());
        self.metrics_recorded
            .set(i64::try_from(metrics_recorded).unwrap_or(i64::MAX));
        #[allow(clippy::cast_precision_loss)]
        self.last_poll_timestamp.set(now as f64);

        self.update_state(|state| {
            state.polls += 1;
            state.last_poll = Some(now);
            state.last_poll_metrics = metrics_recorded;
        });
    }

    pub fn record_target_failure(&self, target: &str) {
        self.target_failures_total.with_label_values(&[target]).inc();
    }

    pub fn record_query_failure(&self, target: &str, query: &str) {
        self.query_failures_total
            .with_label_values(&[target, query])
            .inc();
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures_total.inc();
    }

    pub fn set_running(&self, running: bool) {
        self.update_state(|state| state.running = running);
    }

    pub fn state(&self) -> AgentState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("agent state lock poisoned, recovering");
                *poisoned.into_inner()
            }
        }
    }

    /// Render the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    fn update_state(&self, update: impl FnOnce(&mut AgentState)) {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("agent state lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        update(&mut guard);
    }
}
