use crate::connection::SqlClient;
use crate::queries::config::QueryConfig;
use crate::queries::{QUERY_NAMES, Query, QueryType, all_factories};
use anyhow::{Result, bail};
use std::sync::Arc;

/// Ordered set of enabled queries.
#[derive(Clone)]
pub struct QueryRegistry {
    queries: Vec<QueryType>,
}

impl QueryRegistry {
    pub fn new(config: &QueryConfig) -> Self {
        let factories = all_factories();

        // Walk QUERY_NAMES rather than the config set so the order is fixed.
        let queries = QUERY_NAMES
            .iter()
            .filter(|name| config.is_enabled(name))
            .filter_map(|name| factories.get(*name).map(|f| f()))
            .collect();

        Self { queries }
    }

    /// Prepare the immutable query list shared by every poll.
    ///
    /// # Errors
    ///
    /// Returns an error when no query is enabled; nothing could be polled.
    pub fn prepare(&self) -> Result<Vec<Arc<dyn Query<SqlClient>>>> {
        if self.queries.is_empty() {
            bail!("no queries enabled; enable at least one with --query.<name>");
        }

        Ok(self
            .queries
            .iter()
            .cloned()
            .map(|q| Arc::new(q) as Arc<dyn Query<SqlClient>>)
            .collect())
    }

    pub fn query_names(&self) -> Vec<&'static str> {
        self.queries.iter().map(Query::<SqlClient>::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
