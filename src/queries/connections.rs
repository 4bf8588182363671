use crate::connection::SqlClient;
use crate::endpoint::EndpointKind;
use crate::queries::{DatabaseScope, Query, Row, Sample, util};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

const SQL: &str = r"
SELECT
    CAST((SELECT COUNT(*) FROM sys.dm_exec_connections) AS float) AS connections,
    CAST((SELECT COUNT(*) FROM sys.dm_exec_sessions WHERE is_user_process = 1) AS float) AS user_sessions,
    CAST((SELECT COUNT(*) FROM sys.dm_exec_requests WHERE blocking_session_id <> 0) AS float) AS blocked_requests
";

/// Connection, user session and blocked request counts.
#[derive(Clone, Default)]
pub struct ConnectionsQuery;

impl ConnectionsQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query<SqlClient> for ConnectionsQuery {
    fn name(&self) -> &'static str {
        "connections"
    }

    fn supports(&self, _kind: EndpointKind) -> bool {
        true
    }

    fn fetch<'a>(
        &'a self,
        conn: &'a mut SqlClient,
        _scope: &'a DatabaseScope,
    ) -> BoxFuture<'a, Result<Vec<Row>>> {
        Box::pin(async move {
            let query_span = info_span!(
                "db.query",
                otel.kind = "client",
                db.system = "mssql",
                db.operation = "SELECT",
                db.sql.table = "sys.dm_exec_connections"
            );

            let rows = async move { conn.simple_query(SQL).await?.into_first_result().await }
                .instrument(query_span)
                .await?;

            let mut samples = Vec::with_capacity(rows.len());
            for row in &rows {
                let connections = util::float(row, "connections")?;
                let user_sessions = util::float(row, "user_sessions")?;
                let blocked = util::float(row, "blocked_requests")?;

                debug!(connections, user_sessions, blocked, "read connection counts");

                samples.push(Row::Sample(
                    Sample::new("Connections")
                        .with("Count", "connections", connections)
                        .with("UserSessions", "sessions", user_sessions)
                        .with("BlockedRequests", "requests", blocked),
                ));
            }

            Ok(samples)
        })
    }
}
