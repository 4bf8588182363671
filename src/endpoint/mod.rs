//! Monitored endpoints.
//!
//! A [`Target`] is either an on-premises SQL Server or an Azure SQL database.
//! Both run the same query battery; they differ in the component they report
//! as, which queries apply to them, and how rows are post-processed.

pub mod azure;
pub mod databases;
pub mod delta;
pub mod sql_server;

pub use azure::AzureSqlDatabase;
pub use delta::DeltaEngine;
pub use sql_server::SqlServer;

use crate::config::Settings;
use crate::queries::{Aggregation, DatabaseScope, Row};
use crate::sink::ComponentData;
use secrecy::SecretString;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    SqlServer,
    AzureSqlDatabase,
}

impl EndpointKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SqlServer => "sql_server",
            Self::AzureSqlDatabase => "azure_sql_database",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Endpoint: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> EndpointKind;

    /// Platform component type this endpoint reports as.
    fn component_guid(&self) -> &'static str;

    fn connection_string(&self) -> &SecretString;

    /// Databases per-database queries are restricted to.
    fn database_scope(&self) -> &DatabaseScope;

    fn delta_engine_mut(&mut self) -> &mut DeltaEngine;

    /// Adjust the rows of one query before they are recorded.
    fn post_process(&self, _rows: &mut Vec<Row>) {}

    fn component_data(&self, duration: Duration) -> ComponentData {
        ComponentData::new(self.name(), self.component_guid(), duration)
    }

    /// Aggregate and post-process the rows of one query.
    ///
    /// For `Aggregation::DmlIncrease` the activity rows are replaced by exactly
    /// one `Row::DmlIncrease`, even when the query returned nothing.
    fn process_rows(&mut self, aggregation: Aggregation, rows: Vec<Row>) -> Vec<Row> {
        let mut rows = match aggregation {
            Aggregation::Passthrough => rows,
            Aggregation::DmlIncrease => {
                let (activity, mut rows): (Vec<Row>, Vec<Row>) = rows
                    .into_iter()
                    .partition(|row| matches!(row, Row::DmlActivity(_)));

                let increase = self
                    .delta_engine_mut()
                    .calculate_increase(activity.iter().filter_map(|row| match row {
                        Row::DmlActivity(activity) => Some(activity),
                        _ => None,
                    }));

                rows.push(Row::DmlIncrease(increase));
                rows
            }
        };

        self.post_process(&mut rows);
        rows
    }
}

/// A configured endpoint. Owns its delta engine for the life of the process.
#[derive(Debug)]
pub enum Target {
    SqlServer(SqlServer),
    AzureSqlDatabase(AzureSqlDatabase),
}

impl Target {
    /// Build every configured target, SQL Servers first.
    pub fn from_settings(settings: &Settings) -> Vec<Self> {
        settings
            .sql_servers
            .iter()
            .map(|server| Self::SqlServer(SqlServer::from_settings(server)))
            .chain(
                settings
                    .azure_databases
                    .iter()
                    .map(|db| Self::AzureSqlDatabase(AzureSqlDatabase::from_settings(db))),
            )
            .collect()
    }

    fn inner(&self) -> &dyn Endpoint {
        match self {
            Self::SqlServer(server) => server,
            Self::AzureSqlDatabase(db) => db,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Endpoint {
        match self {
            Self::SqlServer(server) => server,
            Self::AzureSqlDatabase(db) => db,
        }
    }
}

impl Endpoint for Target {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn kind(&self) -> EndpointKind {
        self.inner().kind()
    }

    fn component_guid(&self) -> &'static str {
        self.inner().component_guid()
    }

    fn connection_string(&self) -> &SecretString {
        self.inner().connection_string()
    }

    fn database_scope(&self) -> &DatabaseScope {
        self.inner().database_scope()
    }

    fn delta_engine_mut(&mut self) -> &mut DeltaEngine {
        self.inner_mut().delta_engine_mut()
    }

    fn post_process(&self, rows: &mut Vec<Row>) {
        self.inner().post_process(rows);
    }
}
