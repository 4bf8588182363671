//! Connection provider for SQL Server targets.
//!
//! Connections are opened once per target per poll and closed when the
//! target's queries are done. Connection strings are ADO.NET style
//! (`server=tcp:host,1433;user id=...;password=...`) and are never logged
//! without masking the password first.

use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tiberius::{Client, Config, error::Error as TdsError};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// A live TDS client over tokio's TCP stream.
pub type SqlClient = Client<Compat<TcpStream>>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[allow(clippy::expect_used)]
static PASSWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(password|pwd)\s*=\s*("[^"]*"|'[^']*'|\{[^}]*\}|[^;]*)"#)
        .expect("password pattern")
});

/// Replace the password of an ADO.NET connection string with `[redacted]`.
pub fn mask_connection_string(connection_string: &str) -> String {
    PASSWORD
        .replace_all(connection_string, "$1=[redacted]")
        .into_owned()
}

/// Opens and closes connections for a target.
pub trait Connector: Send + Sync {
    type Connection: Send;

    fn connect<'a>(
        &'a self,
        name: &'a str,
        connection_string: &'a SecretString,
    ) -> BoxFuture<'a, Result<Self::Connection>>;

    /// Release a connection. Dropping the connection also releases it; this
    /// lets the server see a clean logout.
    fn close(&self, conn: Self::Connection) -> BoxFuture<'_, Result<()>>;
}

#[derive(Clone, Debug)]
pub struct SqlConnector {
    connect_timeout: Duration,
}

impl Default for SqlConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl SqlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for SqlConnector {
    type Connection = SqlClient;

    fn connect<'a>(
        &'a self,
        name: &'a str,
        connection_string: &'a SecretString,
    ) -> BoxFuture<'a, Result<SqlClient>> {
        Box::pin(async move {
            debug!(
                target: "verbose_sql",
                endpoint = name,
                "Connecting with {}",
                mask_connection_string(connection_string.expose_secret())
            );

            let config = Config::from_ado_string(connection_string.expose_secret())
                .with_context(|| format!("invalid connection string for '{name}'"))?;

            match timeout(self.connect_timeout, open(config)).await {
                Ok(result) => result.with_context(|| format!("failed to connect to '{name}'")),
                Err(_) => Err(anyhow!(
                    "failed to connect to '{name}': timed out after {}s",
                    self.connect_timeout.as_secs()
                )),
            }
        })
    }

    fn close(&self, conn: SqlClient) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            conn.close().await?;
            Ok(())
        })
    }
}

async fn open(config: Config) -> Result<SqlClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways may redirect the login to the node hosting the database.
        Err(TdsError::Routing { host, port }) => {
            info!(%host, port, "login routed to another host");

            let mut config = config;
            config.host(&host);
            config.port(port);

            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;

            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}
