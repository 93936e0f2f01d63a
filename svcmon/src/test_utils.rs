//! Shared test fixtures: fake connectors, failure-injecting stores and socket helpers.

use crate::db::errors::{DbError, Result};
use crate::db::memory::InMemoryStore;
use crate::db::models::{
    LogEntry, NewLogEntry, NewPingRecord, NewService, PingCounts, PingRecord, Service, ServiceStatus, ServiceUpdate,
};
use crate::db::store::ServiceStore;
use crate::ping::connector::{Connector, ConnectorError, Connectors};
use crate::ping::options::{PingOptions, PingOverrides, ProtocolOverrides};
use crate::ping::protocol::ProtocolKind;
use crate::types::{ServiceId, UserId};
use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TEST_API_KEY: &str = "test-trigger-key";

/// A port on localhost that nothing is listening on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Tests that reach a TLS handshake need the process-wide provider that `main` installs.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Aborts the accept loop (and drops every held socket) when dropped.
pub struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A listener that accepts connections and never writes a byte, so handshakes hang.
pub async fn silent_listener() -> (SocketAddr, ListenerGuard) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    (addr, ListenerGuard(handle))
}

/// Connector whose behaviour is chosen by the host of the connection string:
///
/// | host | outcome |
/// |---|---|
/// | `up` | success after 5ms |
/// | `down` | connection refused |
/// | `flaky` | refused for the first `failing_first` calls, then success |
/// | `garbled` | unexpected reply |
/// | `slow` | success after ~20ms of real time, tracking concurrency |
/// | `hang` | never completes |
/// | `panic` | panics |
#[derive(Default)]
pub struct FakeConnector {
    calls: AtomicUsize,
    fail_first: usize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn refused() -> ConnectorError {
        ConnectorError::Connect {
            message: "connection refused".to_string(),
            elapsed: Duration::from_millis(2),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Redis
    }

    async fn ping(&self, connection_string: &str, _options: &PingOptions) -> std::result::Result<Duration, ConnectorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let host = url::Url::parse(connection_string)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        match host.as_str() {
            "up" => Ok(Duration::from_millis(5)),
            "down" => Err(Self::refused()),
            "flaky" if call <= self.fail_first => Err(Self::refused()),
            "flaky" => Ok(Duration::from_millis(5)),
            "garbled" => Err(ConnectorError::InvalidResponse {
                message: "expected PONG".to_string(),
                elapsed: Duration::from_millis(1),
            }),
            "slow" => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Duration::from_millis(20))
            }
            "hang" => std::future::pending().await,
            "panic" => panic!("fake connector blew up"),
            other => Err(ConnectorError::invalid_input(format!("unknown fake host '{other}'"))),
        }
    }
}

/// A due, never-checked service pointing at `url`; the protocol comes from the URL scheme.
pub fn service_with_url(url: &str) -> Service {
    let scheme = url.split("://").next().unwrap_or_default();
    let protocol: ProtocolKind = scheme.parse().expect("test url scheme names a protocol");
    let now = Utc::now();

    Service {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: format!("{protocol} test service"),
        connection_url: url.to_string(),
        service_type: protocol.as_str().to_string(),
        protocol,
        status: ServiceStatus::Offline,
        consecutive_failures: 0,
        failures_threshold: 3,
        disabled_on_consecutive_failure: false,
        uptime_percentage: 0.0,
        ping_interval_seconds: 300,
        last_successful_check: None,
        last_failed_check: None,
        next_scheduled_check: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_service() -> Service {
    service_with_url("redis://up")
}

/// Wraps an [`InMemoryStore`] and fails or stalls reads and writes on demand.
#[derive(Default)]
pub struct FailingStore {
    pub inner: InMemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Every write sleeps this long before reaching the inner store.
    pub fn delay_writes(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn check_write(&self) -> Result<()> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("injected write failure")));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("injected read failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceStore for FailingStore {
    async fn create_service(&self, new: &NewService) -> Result<Service> {
        self.check_write().await?;
        self.inner.create_service(new).await
    }

    async fn find_service(&self, id: ServiceId) -> Result<Option<Service>> {
        self.check_read()?;
        self.inner.find_service(id).await
    }

    async fn find_services_due_for_check(
        &self,
        protocol: Option<ProtocolKind>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Service>> {
        self.check_read()?;
        self.inner.find_services_due_for_check(protocol, limit, now).await
    }

    async fn find_services_for_user(&self, user_id: UserId, protocol: Option<ProtocolKind>) -> Result<Vec<Service>> {
        self.check_read()?;
        self.inner.find_services_for_user(user_id, protocol).await
    }

    async fn update_service(&self, id: ServiceId, update: &ServiceUpdate) -> Result<Service> {
        self.check_write().await?;
        self.inner.update_service(id, update).await
    }

    async fn append_ping_record(&self, record: &NewPingRecord) -> Result<PingRecord> {
        self.check_write().await?;
        self.inner.append_ping_record(record).await
    }

    async fn count_ping_records(&self, service_id: ServiceId) -> Result<PingCounts> {
        self.check_read()?;
        self.inner.count_ping_records(service_id).await
    }

    async fn list_ping_records(&self, service_id: ServiceId, limit: i64) -> Result<Vec<PingRecord>> {
        self.check_read()?;
        self.inner.list_ping_records(service_id, limit).await
    }

    async fn append_log(&self, entry: &NewLogEntry) -> Result<LogEntry> {
        self.check_write().await?;
        self.inner.append_log(entry).await
    }
}

/// Configuration for router tests: trigger key set, no database, no background scheduler, and
/// pings that give up quickly.
pub fn create_test_config() -> crate::config::Config {
    let quick = PingOverrides {
        timeout_ms: Some(500),
        retry_count: Some(0),
        retry_delay_ms: Some(0),
        command_timeout_ms: Some(500),
    };

    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        trigger: crate::config::TriggerConfig {
            api_key: Some(TEST_API_KEY.to_string()),
            ..Default::default()
        },
        scheduler: crate::config::SchedulerConfig {
            enabled: false,
            ..Default::default()
        },
        ping: ProtocolOverrides {
            mongodb: quick,
            postgres: quick,
            redis: quick,
        },
        leader_election: crate::config::LeaderElectionConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A test server over `store`, with every protocol served by a [`FakeConnector`].
pub async fn create_test_app(store: Arc<InMemoryStore>) -> (TestServer, crate::BackgroundServices) {
    create_test_app_with_config(store, create_test_config()).await
}

pub async fn create_test_app_with_config(
    store: Arc<InMemoryStore>,
    config: crate::config::Config,
) -> (TestServer, crate::BackgroundServices) {
    let app = crate::Application::new_with_store(config, store, None, Connectors::uniform(Arc::new(FakeConnector::new())))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}
