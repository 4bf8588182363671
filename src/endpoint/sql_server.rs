use crate::config::SqlServerSettings;
use crate::endpoint::databases::DatabaseDisplayMap;
use crate::endpoint::{DeltaEngine, Endpoint, EndpointKind};
use crate::queries::{DatabaseScope, Row};
use secrecy::{ExposeSecret, SecretString};

pub const COMPONENT_GUID: &str = "com.newrelic.platform.microsoft.sqlserver";

/// A SQL Server instance. Reports every user database it hosts unless the
/// configuration narrows the list; the narrowing happens in the queries.
#[derive(Debug)]
pub struct SqlServer {
    name: String,
    connection_string: SecretString,
    display_names: DatabaseDisplayMap,
    scope: DatabaseScope,
    dml: DeltaEngine,
}

impl SqlServer {
    pub fn new(name: impl Into<String>, connection_string: SecretString) -> Self {
        Self {
            name: name.into(),
            connection_string,
            display_names: DatabaseDisplayMap::default(),
            scope: DatabaseScope::default(),
            dml: DeltaEngine::new(),
        }
    }

    pub fn from_settings(settings: &SqlServerSettings) -> Self {
        Self {
            display_names: DatabaseDisplayMap::new(&settings.included_databases),
            scope: DatabaseScope::new(
                &settings.included_databases,
                &settings.excluded_databases,
                settings.include_system_databases,
            ),
            ..Self::new(
                settings.name.clone(),
                SecretString::from(settings.connection_string.expose_secret()),
            )
        }
    }
}

impl Endpoint for SqlServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::SqlServer
    }

    fn component_guid(&self) -> &'static str {
        COMPONENT_GUID
    }

    fn connection_string(&self) -> &SecretString {
        &self.connection_string
    }

    fn delta_engine_mut(&mut self) -> &mut DeltaEngine {
        &mut self.dml
    }

    fn database_scope(&self) -> &DatabaseScope {
        &self.scope
    }

    fn post_process(&self, rows: &mut Vec<Row>) {
        self.display_names.apply(rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseSettings;
    use crate::queries::Sample;

    fn production() -> SqlServer {
        SqlServer::from_settings(&SqlServerSettings {
            name: "Prod".to_string(),
            connection_string: SecretString::from("server=.".to_string()),
            included_databases: vec![
                DatabaseSettings {
                    name: "Baz".to_string(),
                    display_name: Some("Assassins".to_string()),
                },
                DatabaseSettings {
                    name: "Billing".to_string(),
                    display_name: None,
                },
            ],
            excluded_databases: vec!["Scratch".to_string()],
            include_system_databases: false,
        })
    }

    #[test]
    fn test_post_process_only_renames() {
        let mut rows = vec![
            Row::Sample(Sample::for_database("Database", "BAZ")),
            Row::Sample(Sample::for_database("Database", "billing")),
            Row::Sample(Sample::for_database("Database", "Other")),
            Row::Sample(Sample::for_database("Database", "master")),
        ];
        production().post_process(&mut rows);

        let names: Vec<_> = rows.iter().filter_map(Row::database_name).collect();
        assert_eq!(names, vec!["Assassins", "billing", "Other", "master"]);
    }

    #[test]
    fn test_scope_comes_from_settings() {
        let server = production();
        let scope = server.database_scope();

        assert_eq!(scope.included(), ["baz".to_string(), "billing".to_string()]);
        assert_eq!(scope.excluded(), ["scratch".to_string()]);
        assert!(!scope.include_system());
    }

    #[test]
    fn test_plain_server_scope() {
        let server = SqlServer::new("Dev", SecretString::from("server=.".to_string()));

        assert_eq!(server.database_scope(), &DatabaseScope::default());
        assert_eq!(server.component_guid(), COMPONENT_GUID);
    }
}
