use crate::connection::SqlClient;
use crate::endpoint::EndpointKind;
use crate::queries::{DatabaseScope, Query, Row, Sample, util};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

const SQL: &str = r"
SELECT
    DB_NAME() AS database_name,
    CAST(SUM(reserved_page_count) * 8.0 / 1024 AS float) AS reserved_mb,
    CAST(SUM(used_page_count) * 8.0 / 1024 AS float) AS used_mb
FROM sys.dm_db_partition_stats
";

/// Reserved and used space of the connected Azure SQL database.
#[derive(Clone, Default)]
pub struct AzureDatabaseSizeQuery;

impl AzureDatabaseSizeQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query<SqlClient> for AzureDatabaseSizeQuery {
    fn name(&self) -> &'static str {
        "azure_database_size"
    }

    fn supports(&self, kind: EndpointKind) -> bool {
        kind == EndpointKind::AzureSqlDatabase
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
                db.sql.table = "sys.dm_db_partition_stats"
            );

            let rows = async move { conn.simple_query(SQL).await?.into_first_result().await }
                .instrument(query_span)
                .await?;

            let mut samples = Vec::with_capacity(rows.len());
            for row in &rows {
                let Some(database) = util::text(row, "database_name")? else {
                    continue;
                };

                let reserved = util::float(row, "reserved_mb")?;
                let used = util::float(row, "used_mb")?;

                debug!(database, reserved, used, "read azure database size");

                samples.push(Row::Sample(
                    Sample::for_database("Database", database)
                        .with("Size/Reserved", "megabytes", reserved)
                        .with("Size/Used", "megabytes", used),
                ));
            }

            Ok(samples)
        })
    }
}
