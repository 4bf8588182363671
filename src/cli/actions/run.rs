use crate::agent::Agent;
use crate::cli::actions::Action;
use crate::cli::telemetry::shutdown_tracer;
use crate::config::Settings;
use crate::queries::config::QueryConfig;
use crate::status::{self, shutdown::shutdown_signal};
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

/// Handle the run action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run {
            config,
            collect_only,
            poll_interval,
            status_port,
            listen,
            queries,
        } => {
            let mut settings = Settings::load(&config)?;

            if collect_only {
                settings.collect_only = true;
            }

            if let Some(secs) = poll_interval {
                settings.poll_interval_secs = secs;
            }

            settings.validate().context("invalid configuration")?;

            println!(
                "{} {} - polling {} target(s) every {}s{}\n\nEnabled queries:\n{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                settings.target_count(),
                settings.poll_interval_secs,
                if settings.collect_only { " (collect only)" } else { "" },
                format_list(&queries),
            );

            let agent = Agent::new(settings, QueryConfig::new().with_enabled(&queries));
            agent.start().await?;

            let (stop, mut stopped) = watch::channel(false);

            let server = match status_port {
                Some(port) => {
                    let (listener, bind_addr) = status::bind(port, listen.as_deref()).await?;
                    println!("\nStatus server listening on {bind_addr}");

                    let metrics = agent.metrics().clone();
                    Some(tokio::spawn(status::serve(listener, metrics, async move {
                        let _ = stopped.changed().await;
                    })))
                }
                None => None,
            };

            shutdown_signal().await;

            info!("shutting down");

            agent.stop().await;

            let _ = stop.send(true);
            if let Some(server) = server {
                match server.await {
                    Ok(Err(e)) => error!("status server failed: {e:#}"),
                    Err(e) => error!("status server task failed: {e}"),
                    Ok(Ok(())) => {}
                }
            }

            shutdown_tracer();
        }
    }

    Ok(())
}

// Helper to format a list of items with a leading dash and indentation for the
// start up message
fn format_list<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}
