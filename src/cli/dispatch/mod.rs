use crate::{
    cli::actions::Action,
    queries::{QUERY_NAMES, Query, all_factories},
};
use anyhow::{Result, anyhow};
use clap::ArgMatches;
use std::path::PathBuf;
use tracing::debug;

pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let config = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .ok_or_else(|| anyhow!("Config file is required. Please provide it using the --config flag."))?;

    let queries = get_enabled_queries(matches);

    debug!("Enabled queries: {:?}", queries);

    Ok(Action::Run {
        config,
        collect_only: matches.get_flag("collect-only"),
        poll_interval: matches.get_one::<u64>("poll-interval").copied(),
        status_port: matches.get_one::<u16>("status-port").copied(),
        listen: matches.get_one::<String>("listen").cloned(),
        queries,
    })
}

/// Queries to run, in registry order.
pub fn get_enabled_queries(matches: &ArgMatches) -> Vec<String> {
    let factories = all_factories();

    QUERY_NAMES
        .iter()
        .filter(|&&name| {
            // If explicitly disabled, skip it
            if matches.get_flag(&format!("no-query.{name}")) {
                return false;
            }

            if matches.get_flag(&format!("query.{name}")) {
                return true;
            }

            factories
                .get(name)
                .is_some_and(|factory| factory().enabled_by_default())
        })
        .map(|&name| name.to_string())
        .collect()
}
