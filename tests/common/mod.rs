#![allow(dead_code)]

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use mssql_agent::{
    connection::Connector,
    endpoint::EndpointKind,
    poller::QueryContext,
    queries::{Aggregation, DatabaseScope, Query, Row},
    sink::Sink,
};
use secrecy::SecretString;
use std::collections::HashSet;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Connection string of a test SQL Server, if one is available.
///
/// SAFETY: Tests should ALWAYS run against a local server. If
/// `MSSQL_AGENT_TEST_CONNECTION` is set we verify it points to localhost.
pub fn get_test_connection() -> Option<SecretString> {
    let cs = env::var("MSSQL_AGENT_TEST_CONNECTION").ok()?;

    let lower = cs.to_lowercase();
    if !lower.contains("localhost") && !lower.contains("127.0.0.1") && !lower.contains("server=.")
    {
        eprintln!("⚠️  WARNING: MSSQL_AGENT_TEST_CONNECTION points to a remote server!");
        eprintln!(
            "⚠️  Connection: {}",
            mssql_agent::connection::mask_connection_string(&cs)
        );
        panic!("Refusing to run tests against a remote server. Use localhost.");
    }

    Some(SecretString::from(cs))
}

/// Find an available port for testing (returns port > 1024)
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;

    // Bind to port 0 lets the OS assign an available ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener
        .local_addr()
        .expect("Failed to get local addr")
        .port();

    assert!(port > 1024, "Assigned port {} should be > 1024", port);

    port
}

/// Wait for server to be ready on the given port
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    use tokio::time::{Duration, sleep};

    for _ in 1..=max_attempts {
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return true;
        }

        sleep(Duration::from_millis(100)).await;
    }

    eprintln!(
        "Failed to connect to server on port {} after {} attempts",
        port, max_attempts
    );
    false
}

/// Get base URL for test server
pub fn get_test_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

// ============================================================================
// In-memory stand-ins for a database and the collector
// ============================================================================

#[derive(Debug)]
pub struct FakeConnection {
    pub target: String,
}

/// Connector that never touches the network.
#[derive(Clone, Default)]
pub struct FakeConnector {
    failing: Arc<Mutex<HashSet<String>>>,
    panicking: Arc<HashSet<String>>,
    barrier: Option<Arc<tokio::sync::Barrier>>,
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(self, target: &str) -> Self {
        self.set_failing(target, true);
        self
    }

    /// Make connections to `target` fail (or succeed again) from now on.
    pub fn set_failing(&self, target: &str, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(target.to_string());
        } else {
            failing.remove(target);
        }
    }

    /// Every connect waits until `parties` connects are in flight at once.
    #[must_use]
    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(tokio::sync::Barrier::new(parties)));
        self
    }

    #[must_use]
    pub fn panicking(mut self, target: &str) -> Self {
        Arc::make_mut(&mut self.panicking).insert(target.to_string());
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    type Connection = FakeConnection;

    fn connect<'a>(
        &'a self,
        name: &'a str,
        _connection_string: &'a SecretString,
    ) -> BoxFuture<'a, Result<FakeConnection>> {
        Box::pin(async move {
            if self.panicking.contains(name) {
                panic!("driver crashed for {name}");
            }

            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }

            if self.failing.lock().unwrap().contains(name) {
                return Err(anyhow!("login failed for '{name}'"));
            }

            self.connects.fetch_add(1, Ordering::SeqCst);

            Ok(FakeConnection {
                target: name.to_string(),
            })
        })
    }

    fn close(&self, _conn: FakeConnection) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

type Respond = dyn Fn(&str, &DatabaseScope) -> Result<Vec<Row>> + Send + Sync;

/// Query answering from a closure keyed on the target name.
pub struct FakeQuery {
    name: &'static str,
    kinds: Vec<EndpointKind>,
    aggregation: Aggregation,
    respond: Box<Respond>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeQuery {
    pub fn new(
        name: &'static str,
        respond: impl Fn(&str) -> Result<Vec<Row>> + Send + Sync + 'static,
    ) -> Self {
        Self::scoped(name, move |target, _scope| respond(target))
    }

    /// Like `new`, but the closure also sees the target's database scope.
    pub fn scoped(
        name: &'static str,
        respond: impl Fn(&str, &DatabaseScope) -> Result<Vec<Row>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            kinds: vec![EndpointKind::SqlServer, EndpointKind::AzureSqlDatabase],
            aggregation: Aggregation::Passthrough,
            respond: Box::new(respond),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn only(mut self, kind: EndpointKind) -> Self {
        self.kinds = vec![kind];
        self
    }

    #[must_use]
    pub fn aggregated(mut self) -> Self {
        self.aggregation = Aggregation::DmlIncrease;
        self
    }

    pub fn shared(self) -> Arc<dyn Query<FakeConnection>> {
        Arc::new(self)
    }
}

impl Query<FakeConnection> for FakeQuery {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, kind: EndpointKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    fn fetch<'a>(
        &'a self,
        conn: &'a mut FakeConnection,
        scope: &'a DatabaseScope,
    ) -> BoxFuture<'a, Result<Vec<Row>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(&conn.target, scope)
        })
    }
}

/// Sink recording every batch it is handed.
#[derive(Clone, Default)]
pub struct CaptureSink {
    pub batches: Arc<Mutex<Vec<Vec<QueryContext>>>>,
    pub fail: Arc<std::sync::atomic::AtomicBool>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<QueryContext>> {
        self.batches.lock().unwrap().clone()
    }

    /// Metric value of `target` in the last batch.
    pub fn last_metric(&self, target: &str, key: &str) -> Option<f64> {
        let batches = self.batches();
        let batch = batches.last()?;

        batch
            .iter()
            .filter(|context| context.component.name == target)
            .find_map(|context| context.component.metrics.get(key).copied())
    }
}

impl Sink for CaptureSink {
    fn send<'a>(&'a self, contexts: &'a [QueryContext]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.batches.lock().unwrap().push(contexts.to_vec());

            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("collector unavailable"));
            }

            Ok(())
        })
    }
}
