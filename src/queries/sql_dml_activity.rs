use crate::connection::SqlClient;
use crate::endpoint::EndpointKind;
use crate::queries::{Aggregation, CounterClass, DatabaseScope, DmlActivity, Query, Row, util};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

// One row per cached plan statement. Counters are cumulative since
// creation_time, so the endpoint turns them into per-interval increases.
const SQL: &str = r"
SELECT
    qs.plan_handle,
    qs.query_hash AS sql_statement_hash,
    qs.creation_time,
    qs.execution_count,
    CASE
        WHEN st.text LIKE '%INSERT %'
          OR st.text LIKE '%UPDATE %'
          OR st.text LIKE '%DELETE %'
          OR st.text LIKE '%MERGE %'
        THEN 'Writes'
        ELSE 'Reads'
    END AS query_type
FROM sys.dm_exec_query_stats AS qs
CROSS APPLY sys.dm_exec_sql_text(qs.sql_handle) AS st
WHERE st.dbid IS NULL OR st.dbid > 4
";

/// Plan-cache execution counts split into reads and writes.
///
/// Emits raw [`DmlActivity`] rows; the owning endpoint aggregates them into a
/// single `DmlIncrease` per poll.
#[derive(Clone, Default)]
pub struct SqlDmlActivityQuery;

impl SqlDmlActivityQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query<SqlClient> for SqlDmlActivityQuery {
    fn name(&self) -> &'static str {
        "sql_dml_activity"
    }

    fn supports(&self, _kind: EndpointKind) -> bool {
        true
    }

    fn aggregation(&self) -> Aggregation {
        Aggregation::DmlIncrease
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
                db.sql.table = "sys.dm_exec_query_stats"
            );

            let rows = async move { conn.simple_query(SQL).await?.into_first_result().await }
                .instrument(query_span)
                .await?;

            let mut activity = Vec::with_capacity(rows.len());
            for row in &rows {
                let query_type = util::text(row, "query_type")?
                    .unwrap_or("Reads")
                    .parse::<CounterClass>()
                    .context("unexpected query_type")?;

                activity.push(Row::DmlActivity(DmlActivity {
                    plan_handle: util::binary(row, "plan_handle")?,
                    sql_statement_hash: util::binary(row, "sql_statement_hash")?,
                    creation_time: util::datetime(row, "creation_time")?,
                    execution_count: util::bigint(row, "execution_count")?,
                    query_type,
                }));
            }

            debug!(plans = activity.len(), "read plan cache activity");

            Ok(activity)
        })
    }
}
