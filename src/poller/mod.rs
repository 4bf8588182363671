//! One poll: every target concurrently, then one batch to the sink.

use crate::agent::AgentMetrics;
use crate::connection::Connector;
use crate::endpoint::{Endpoint, Target};
use crate::queries::Query;
use crate::scheduler::panic_message;
use crate::sink::Sink;
use anyhow::Result;
use futures::{FutureExt, StreamExt, stream::FuturesUnordered};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, instrument, warn};
use tracing_futures::Instrument as _;

mod context;
pub mod executor;

pub use context::QueryContext;
pub use executor::QueryResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub targets: usize,
    pub failed_targets: usize,
    pub metrics_recorded: usize,
    pub sent: bool,
}

pub struct Poller<K: Connector, S: Sink> {
    targets: Vec<Target>,
    queries: Vec<Arc<dyn Query<K::Connection>>>,
    connector: K,
    sink: S,
    interval: Duration,
    metrics: AgentMetrics,
}

impl<K: Connector, S: Sink> Poller<K, S> {
    pub fn new(
        targets: Vec<Target>,
        queries: Vec<Arc<dyn Query<K::Connection>>>,
        connector: K,
        sink: S,
        interval: Duration,
        metrics: AgentMetrics,
    ) -> Self {
        Self {
            targets,
            queries,
            connector,
            sink,
            interval,
            metrics,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Poll every target and hand the results to the sink.
    ///
    /// Targets are queried concurrently. A target that fails to connect or
    /// panics contributes nothing; the others are unaffected. Rows are run
    /// through each target's endpoint only after every target has finished,
    /// and the sink is called exactly once.
    #[instrument(skip_all, name = "poll", fields(targets = self.targets.len()))]
    pub async fn poll(&mut self) -> PollSummary {
        let started = Instant::now();

        let Self {
            targets,
            queries,
            connector,
            sink,
            interval,
            metrics,
        } = self;

        let queries: &[Arc<dyn Query<K::Connection>>] = queries;
        let connector: &K = connector;
        let metrics: &AgentMetrics = metrics;

        let mut pending: FuturesUnordered<_> = targets
            .iter()
            .enumerate()
            .map(|(index, target)| {
                let span = info_span!("target", endpoint = %target.name(), kind = %target.kind());

                AssertUnwindSafe(poll_target(target, queries, connector, metrics))
                    .catch_unwind()
                    .map(move |outcome| (index, outcome))
                    .instrument(span)
            })
            .collect();

        let mut raw = Vec::with_capacity(targets.len());
        let mut failed_targets = Vec::new();

        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                Ok(Ok(results)) => raw.push((index, results)),
                Ok(Err(e)) => failed_targets.push((index, format!("{e:#}"))),
                Err(panic) => {
                    failed_targets.push((index, format!("panicked: {}", panic_message(&*panic))));
                }
            }
        }

        drop(pending);

        for (index, reason) in &failed_targets {
            if let Some(target) = targets.get(*index) {
                error!(endpoint = %target.name(), "Failed to poll target: {reason}");
                metrics.record_target_failure(target.name());
            }
        }

        // Keep the batch in configuration order.
        raw.sort_by_key(|(index, _)| *index);

        let mut contexts = Vec::new();
        for (index, results) in raw {
            let Some(target) = targets.get_mut(index) else {
                continue;
            };

            for result in results {
                let rows = target.process_rows(result.aggregation, result.rows);
                contexts.push(QueryContext::new(
                    result.query,
                    rows,
                    target.component_data(*interval),
                ));
            }
        }

        let metrics_recorded: usize = contexts.iter().map(|c| c.metrics_recorded).sum();

        let sent = match sink.send(&contexts).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send metrics: {e:#}");
                metrics.record_sink_failure();
                false
            }
        };

        info!("Recorded {metrics_recorded} metrics");

        metrics.record_poll(started.elapsed(), metrics_recorded);

        PollSummary {
            targets: targets.len(),
            failed_targets: failed_targets.len(),
            metrics_recorded,
            sent,
        }
    }
}

async fn poll_target<K: Connector>(
    target: &Target,
    queries: &[Arc<dyn Query<K::Connection>>],
    connector: &K,
    metrics: &AgentMetrics,
) -> Result<Vec<QueryResult>> {
    let mut conn = connector
        .connect(target.name(), target.connection_string())
        .await?;

    let results = executor::execute(
        target.name(),
        target.kind(),
        target.database_scope(),
        queries,
        &mut conn,
        metrics,
    )
    .await;

    if let Err(e) = connector.close(conn).await {
        warn!(endpoint = %target.name(), "Failed to close connection: {e:#}");
    }

    Ok(results)
}
