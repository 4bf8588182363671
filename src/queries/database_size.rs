use crate::connection::SqlClient;
use crate::endpoint::EndpointKind;
use crate::queries::{DatabaseScope, Query, Row, Sample, util};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

// size is in 8 KB pages.
const SELECT: &str = r"
SELECT
    DB_NAME(database_id) AS database_name,
    CAST(SUM(CASE WHEN type = 0 THEN size ELSE 0 END) * 8.0 / 1024 AS float) AS data_size_mb,
    CAST(SUM(CASE WHEN type = 1 THEN size ELSE 0 END) * 8.0 / 1024 AS float) AS log_size_mb
FROM sys.master_files
";

fn sql(scope: &DatabaseScope) -> (String, Vec<String>) {
    let (condition, params) = scope.where_clause("DB_NAME(database_id)");
    (
        format!("{SELECT}WHERE {condition}\nGROUP BY database_id\n"),
        params,
    )
}

/// Data and log file sizes per database.
#[derive(Clone, Default)]
pub struct DatabaseSizeQuery;

impl DatabaseSizeQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query<SqlClient> for DatabaseSizeQuery {
    fn name(&self) -> &'static str {
        "database_size"
    }

    fn supports(&self, kind: EndpointKind) -> bool {
        kind == EndpointKind::SqlServer
    }

    fn fetch<'a>(
        &'a self,
        conn: &'a mut SqlClient,
        scope: &'a DatabaseScope,
    ) -> BoxFuture<'a, Result<Vec<Row>>> {
        Box::pin(async move {
            let query_span = info_span!(
                "db.query",
                otel.kind = "client",
                db.system = "mssql",
                db.operation = "SELECT",
                db.sql.table = "sys.master_files"
            );

            let (sql, params) = sql(scope);
            let mut query = tiberius::Query::new(sql);
            for param in params {
                query.bind(param);
            }

            let rows = async move { query.query(conn).await?.into_first_result().await }
                .instrument(query_span)
                .await?;

            let mut samples = Vec::with_capacity(rows.len());
            for row in &rows {
                // DB_NAME() is NULL for databases dropped mid-query.
                let Some(database) = util::text(row, "database_name")? else {
                    continue;
                };

                let data = util::float(row, "data_size_mb")?;
                let log = util::float(row, "log_size_mb")?;

                debug!(database, data, log, "read database size");

                samples.push(Row::Sample(
                    Sample::for_database("Database", database)
                        .with("Size/Data", "megabytes", data)
                        .with("Size/Log", "megabytes", log),
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
    fn test_database_size_query_name() {
        assert_eq!(DatabaseSizeQuery::new().name(), "database_size");
        assert!(!DatabaseSizeQuery::new().supports(EndpointKind::AzureSqlDatabase));
    }

    #[test]
    fn test_sql_is_restricted_to_scope() {
        let scope = DatabaseScope::new(&[], &["Scratch".to_string()], false);
        let (sql, params) = sql(&scope);

        assert!(sql.contains("WHERE LOWER(DB_NAME(database_id)) NOT IN ('master'"));
        assert!(sql.contains("AND LOWER(DB_NAME(database_id)) NOT IN (@P1)"));
        assert!(sql.trim_end().ends_with("GROUP BY database_id"));
        assert_eq!(params, vec!["scratch"]);
    }
}
