use crate::connection::SqlClient;
use crate::endpoint::EndpointKind;
use crate::queries::{DatabaseScope, Query, Row, Sample, util};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

// counter_name is nchar(128); '=' ignores the trailing padding.
const SQL: &str = r"
SELECT
    CAST(MAX(CASE WHEN counter_name = 'Page life expectancy' THEN cntr_value END) AS float) AS page_life_expectancy,
    CAST(MAX(CASE WHEN counter_name = 'Buffer cache hit ratio' THEN cntr_value END) AS float) * 100.0
        / NULLIF(CAST(MAX(CASE WHEN counter_name = 'Buffer cache hit ratio base' THEN cntr_value END) AS float), 0)
        AS buffer_cache_hit_ratio
FROM sys.dm_os_performance_counters
WHERE object_name LIKE '%Buffer Manager%'
";

/// Buffer pool health from `sys.dm_os_performance_counters`.
#[derive(Clone, Default)]
pub struct MemoryQuery;

impl MemoryQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query<SqlClient> for MemoryQuery {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports(&self, kind: EndpointKind) -> bool {
        kind == EndpointKind::SqlServer
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
                db.sql.table = "sys.dm_os_performance_counters"
            );

            let rows = async move { conn.simple_query(SQL).await?.into_first_result().await }
                .instrument(query_span)
                .await?;

            let mut samples = Vec::with_capacity(rows.len());
            for row in &rows {
                let page_life_expectancy = util::float(row, "page_life_expectancy")?;
                let hit_ratio = util::float(row, "buffer_cache_hit_ratio")?;

                debug!(page_life_expectancy, hit_ratio, "read buffer manager counters");

                samples.push(Row::Sample(
                    Sample::new("Memory")
                        .with("PageLifeExpectancy", "seconds", page_life_expectancy)
                        .with("BufferCacheHitRatio", "percent", hit_ratio),
                ));
            }

            Ok(samples)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_query_only_for_sql_server() {
        let query = MemoryQuery::new();
        assert!(query.supports(EndpointKind::SqlServer));
        assert!(!query.supports(EndpointKind::AzureSqlDatabase));
    }
}
