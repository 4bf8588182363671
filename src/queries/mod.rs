use crate::{connection::SqlClient, endpoint::EndpointKind};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashMap;

#[macro_use]
mod register_macro;

pub mod rows;
pub use rows::{CounterClass, DmlActivity, DmlIncrease, Row, Sample, Value};

pub mod scope;
pub use scope::DatabaseScope;

/// How an endpoint must treat the rows of a query before recording them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Rows are recorded as returned (after display-name substitution).
    #[default]
    Passthrough,
    /// Rows are cumulative plan-cache counters folded into one `DmlIncrease`.
    DmlIncrease,
}

/// A named diagnostic query, executed against a live connection of type `C`.
///
/// Queries are prepared once at startup and reused for every poll, so they
/// must not carry per-poll state.
pub trait Query<C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Whether the query applies to the given kind of endpoint.
    fn supports(&self, kind: EndpointKind) -> bool;

    fn aggregation(&self) -> Aggregation {
        Aggregation::Passthrough
    }

    /// Run the query. Per-database queries restrict their rows to `scope`.
    fn fetch<'a>(
        &'a self,
        conn: &'a mut C,
        scope: &'a DatabaseScope,
    ) -> BoxFuture<'a, Result<Vec<Row>>>;
}

// The order here is the order queries run against each target.
register_queries! {
    connections => ConnectionsQuery,
    memory => MemoryQuery,
    database_size => DatabaseSizeQuery,
    sql_dml_activity => SqlDmlActivityQuery,
    azure_resource_stats => AzureResourceStatsQuery,
    azure_database_size => AzureDatabaseSizeQuery,
}

// Other modules
pub mod config;
pub mod registry;
pub mod util;
