use crate::config::AzureDatabaseSettings;
use crate::endpoint::{DeltaEngine, Endpoint, EndpointKind};
use crate::queries::DatabaseScope;
use secrecy::{ExposeSecret, SecretString};

pub const COMPONENT_GUID: &str = "com.newrelic.platform.microsoft.azure.sqldatabase";

/// A single Azure SQL database. The connection is scoped to one database so
/// rows are reported as they come back.
#[derive(Debug)]
pub struct AzureSqlDatabase {
    name: String,
    connection_string: SecretString,
    scope: DatabaseScope,
    dml: DeltaEngine,
}

impl AzureSqlDatabase {
    pub fn new(name: impl Into<String>, connection_string: SecretString) -> Self {
        Self {
            name: name.into(),
            connection_string,
            // the connection already targets a single database
            scope: DatabaseScope::new(&[], &[], true),
            dml: DeltaEngine::new(),
        }
    }

    pub fn from_settings(settings: &AzureDatabaseSettings) -> Self {
        Self::new(
            settings.name.clone(),
            SecretString::from(settings.connection_string.expose_secret()),
        )
    }
}

impl Endpoint for AzureSqlDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::AzureSqlDatabase
    }

    fn component_guid(&self) -> &'static str {
        COMPONENT_GUID
    }

    fn connection_string(&self) -> &SecretString {
        &self.connection_string
    }

    fn database_scope(&self) -> &DatabaseScope {
        &self.scope
    }

    fn delta_engine_mut(&mut self) -> &mut DeltaEngine {
        &mut self.dml
    }
}
