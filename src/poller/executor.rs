use crate::agent::AgentMetrics;
use crate::endpoint::EndpointKind;
use crate::queries::{Aggregation, DatabaseScope, Query, Row};
use crate::scheduler::panic_message;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info_span, trace};
use tracing_futures::Instrument as _;

/// Raw rows of one query, before the endpoint has processed them.
#[derive(Debug)]
pub struct QueryResult {
    pub query: &'static str,
    pub aggregation: Aggregation,
    pub rows: Vec<Row>,
}

/// Run `queries` in order on one connection.
///
/// A failing or panicking query is logged and counted, and the next query
/// still runs on the same connection. Queries that do not apply to `kind` are
/// skipped.
pub async fn execute<C: Send>(
    endpoint: &str,
    kind: EndpointKind,
    scope: &DatabaseScope,
    queries: &[Arc<dyn Query<C>>],
    conn: &mut C,
    metrics: &AgentMetrics,
) -> Vec<QueryResult> {
    let mut results = Vec::with_capacity(queries.len());

    for query in queries {
        let name = query.name();

        if !query.supports(kind) {
            debug!(endpoint, query = name, %kind, "query does not apply, skipping");
            continue;
        }

        let span = info_span!("query", query = name);

        let outcome = AssertUnwindSafe(async { query.fetch(&mut *conn, scope).await })
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(rows)) => {
                debug!(endpoint, query = name, rows = rows.len(), "query completed");
                trace!(target: "verbose_sql", endpoint, query = name, "{rows:?}");

                results.push(QueryResult {
                    query: name,
                    aggregation: query.aggregation(),
                    rows,
                });
            }
            Ok(Err(e)) => {
                error!(endpoint, query = name, "Query failed: {e:#}");
                metrics.record_query_failure(endpoint, name);
            }
            Err(panic) => {
                error!(
                    endpoint,
                    query = name,
                    "Query panicked: {}",
                    panic_message(&*panic)
                );
                metrics.record_query_failure(endpoint, name);
            }
        }
    }

    results
}
