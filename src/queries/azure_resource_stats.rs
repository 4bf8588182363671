use crate::connection::SqlClient;
use crate::endpoint::EndpointKind;
use crate::queries::{DatabaseScope, Query, Row, Sample, util};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

// sys.dm_db_resource_stats keeps one row per 15 seconds for the last hour.
const SQL: &str = r"
SELECT TOP 1
    CAST(avg_cpu_percent AS float) AS avg_cpu_percent,
    CAST(avg_data_io_percent AS float) AS avg_data_io_percent,
    CAST(avg_log_write_percent AS float) AS avg_log_write_percent,
    CAST(avg_memory_usage_percent AS float) AS avg_memory_usage_percent
FROM sys.dm_db_resource_stats
ORDER BY end_time DESC
";

/// Latest resource utilisation of an Azure SQL database.
#[derive(Clone, Default)]
pub struct AzureResourceStatsQuery;

impl AzureResourceStatsQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query<SqlClient> for AzureResourceStatsQuery {
    fn name(&self) -> &'static str {
        "azure_resource_stats"
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
                db.sql.table = "sys.dm_db_resource_stats"
            );

            let rows = async move { conn.simple_query(SQL).await?.into_first_result().await }
                .instrument(query_span)
                .await?;

            let mut samples = Vec::with_capacity(rows.len());
            for row in &rows {
                let cpu = util::float(row, "avg_cpu_percent")?;
                let data_io = util::float(row, "avg_data_io_percent")?;
                let log_write = util::float(row, "avg_log_write_percent")?;
                let memory = util::float(row, "avg_memory_usage_percent")?;

                debug!(cpu, data_io, log_write, memory, "read azure resource stats");

                samples.push(Row::Sample(
                    Sample::new("Resources")
                        .with("Cpu", "percent", cpu)
                        .with("DataIo", "percent", data_io)
                        .with("LogWrite", "percent", log_write)
                        .with("Memory", "percent", memory),
                ));
            }

            Ok(samples)
        })
    }
}
