//! Agent settings, read once from a TOML file before the agent starts.
//!
//! ```toml
//! license_key = "..."
//! poll_interval_secs = 60
//!
//! [[sql_servers]]
//! name = "Production"
//! connection_string = "server=tcp:db01,1433;user id=monitor;password=...;TrustServerCertificate=true"
//! included_databases = [{ name = "Sales", display_name = "Revenue" }]
//! excluded_databases = ["scratch"]
//!
//! [[azure_databases]]
//! name = "Orders"
//! connection_string = "server=tcp:orders.database.windows.net,1433;..."
//! ```

use anyhow::{Context, Result, anyhow, bail};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "https://platform-api.newrelic.com/platform/v1/metrics";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default, deserialize_with = "optional_secret")]
    pub license_key: Option<SecretString>,

    #[serde(default = "default_collector_endpoint")]
    pub collector_endpoint: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Collect and log metrics without sending them.
    #[serde(default)]
    pub collect_only: bool,

    #[serde(default)]
    pub sql_servers: Vec<SqlServerSettings>,

    #[serde(default)]
    pub azure_databases: Vec<AzureDatabaseSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            license_key: None,
            collector_endpoint: default_collector_endpoint(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            collect_only: false,
            sql_servers: Vec::new(),
            azure_databases: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlServerSettings {
    pub name: String,

    #[serde(deserialize_with = "secret")]
    pub connection_string: SecretString,

    #[serde(default)]
    pub included_databases: Vec<DatabaseSettings>,

    #[serde(default)]
    pub excluded_databases: Vec<String>,

    #[serde(default)]
    pub include_system_databases: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    pub name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureDatabaseSettings {
    pub name: String,

    #[serde(deserialize_with = "secret")]
    pub connection_string: SecretString,
}

fn default_collector_endpoint() -> String {
    DEFAULT_COLLECTOR_ENDPOINT.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn optional_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Settings {
    /// Read settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::parse(&contents).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn target_count(&self) -> usize {
        self.sql_servers.len() + self.azure_databases.len()
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.sql_servers
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.azure_databases.iter().map(|d| d.name.as_str()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_count() == 0 {
            bail!("no targets configured; add [[sql_servers]] or [[azure_databases]]");
        }

        let mut seen = HashSet::new();
        for name in self.target_names() {
            if name.trim().is_empty() {
                bail!("target names must not be empty");
            }

            if !seen.insert(name.to_lowercase()) {
                bail!("duplicate target name '{name}'");
            }
        }

        for server in &self.sql_servers {
            let mut reported = HashSet::new();
            for db in &server.included_databases {
                let name = db.display_name.as_deref().unwrap_or(&db.name);
                if !reported.insert(name.to_lowercase()) {
                    bail!(
                        "'{}' reports two databases as '{name}'; display names must be unique",
                        server.name
                    );
                }
            }
        }

        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than 0");
        }

        if !self.collect_only && self.license_key.is_none() {
            bail!("license_key is required unless collect_only is set");
        }

        let endpoint = Url::parse(&self.collector_endpoint)
            .map_err(|e| anyhow!("invalid collector_endpoint '{}': {e}", self.collector_endpoint))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!(
                "collector_endpoint must be an http or https URL, got '{}'",
                self.collector_endpoint
            );
        }

        Ok(())
    }
}
