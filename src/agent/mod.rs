use crate::config::Settings;
use crate::connection::SqlConnector;
use crate::endpoint::{Endpoint, Target};
use crate::poller::Poller;
use crate::queries::{config::QueryConfig, registry::QueryRegistry};
use crate::scheduler::{PollAction, Scheduler, SchedulerSettings};
use crate::sink::PlatformSink;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

pub mod metrics;

pub use metrics::{AgentMetrics, AgentState};

struct Started {
    scheduler: Scheduler,
    error_logger: JoinHandle<()>,
}

/// Owns the configured targets and drives their polling.
pub struct Agent {
    settings: Settings,
    queries: QueryConfig,
    metrics: AgentMetrics,
    started: Mutex<Option<Started>>,
}

impl Agent {
    pub fn new(settings: Settings, queries: QueryConfig) -> Self {
        Self {
            settings,
            queries,
            metrics: AgentMetrics::new(),
            started: Mutex::new(None),
        }
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Prepare the queries and start polling.
    ///
    /// Setup failures are logged and returned; nothing is scheduled in that
    /// case. Calling `start` on a started agent does nothing.
    #[instrument(skip_all, name = "agent.start")]
    pub async fn start(&self) -> Result<()> {
        let mut started = self.started.lock().await;

        if started.is_some() {
            debug!("agent already started");
            return Ok(());
        }

        info!("Service Starting");

        let queries = QueryRegistry::new(&self.queries)
            .prepare()
            .inspect_err(|e| error!("Failed to prepare queries: {e:#}"))?;

        let sink = PlatformSink::new(&self.settings)
            .inspect_err(|e| error!("Failed to create metrics sink: {e:#}"))?;

        let targets = Target::from_settings(&self.settings);
        for target in &targets {
            info!(endpoint = %target.name(), kind = %target.kind(), "Monitoring target");
        }

        let interval = self.settings.poll_interval();

        let poller = Arc::new(Mutex::new(Poller::new(
            targets,
            queries,
            SqlConnector::default(),
            sink,
            interval,
            self.metrics.clone(),
        )));

        let action: PollAction = Arc::new(move || {
            let poller = Arc::clone(&poller);
            Box::pin(async move {
                poller.lock().await.poll().await;
                Ok(())
            })
        });

        let (errors, mut errors_rx) = mpsc::unbounded_channel::<anyhow::Error>();
        let error_logger = tokio::spawn(async move {
            while let Some(e) = errors_rx.recv().await {
                error!("Poll failed: {e:#}");
            }
        });

        let scheduler = Scheduler::new(
            SchedulerSettings {
                name: "poll".to_string(),
                initial_delay: Duration::ZERO,
                interval,
            },
            action,
            errors,
        );
        scheduler.start().await;

        self.metrics.set_running(true);

        *started = Some(Started {
            scheduler,
            error_logger,
        });

        Ok(())
    }

    /// Stop polling, waiting for a poll in progress to finish.
    #[instrument(skip_all, name = "agent.stop")]
    pub async fn stop(&self) {
        let mut started = self.started.lock().await;

        let Some(Started {
            scheduler,
            error_logger,
        }) = started.take()
        else {
            return;
        };

        info!("Service Stopping");

        scheduler.stop(true).await;

        // dropping the scheduler closes the error channel
        drop(scheduler);
        if let Err(e) = error_logger.await {
            error!("error logger failed: {e}");
        }

        self.metrics.set_running(false);
    }

    pub async fn is_started(&self) -> bool {
        self.started.lock().await.is_some()
    }
}
