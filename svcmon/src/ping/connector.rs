//! The connector contract shared by every protocol.
//!
//! A [`Connector`] performs exactly one liveness attempt: open a fresh connection, issue the
//! protocol's cheapest liveness command, close the connection. Connections are never pooled, so a
//! target that hangs one check cannot poison the next one.

use super::protocol::ProtocolKind;
use super::{mongodb::MongoConnector, options::PingOptions, postgres::PostgresConnector, redis::RedisConnector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on how long a connector waits for a graceful close before dropping the connection.
pub const CLOSE_BUDGET: Duration = Duration::from_secs(1);

/// Which part of a ping exceeded its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Command,
    /// The whole call, as enforced by the executor's hard deadline
    Call,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => f.write_str("Connection"),
            Phase::Command => f.write_str("Liveness command"),
            Phase::Call => f.write_str("Ping"),
        }
    }
}

/// Coarse failure category, recorded alongside failed pings in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingErrorKind {
    InvalidInput,
    Connect,
    Command,
    Timeout,
    InvalidResponse,
}

/// Why a single liveness attempt failed.
///
/// Every variant except `InvalidInput` carries the time spent before the failure, because a
/// slow refusal is still useful latency information.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Empty or malformed connection string; no network call was attempted
    #[error("Invalid connection string: {message}")]
    InvalidInput { message: String },

    /// Network or authentication failure while connecting
    #[error("Connection failed: {message}")]
    Connect { message: String, elapsed: Duration },

    /// The liveness command itself returned an error
    #[error("Liveness command failed: {message}")]
    Command { message: String, elapsed: Duration },

    /// A phase exceeded its deadline
    #[error("{phase} timed out after {}ms", elapsed.as_millis())]
    Timeout { phase: Phase, elapsed: Duration },

    /// The server answered, but not with the expected liveness reply
    #[error("Invalid response from server: {message}")]
    InvalidResponse { message: String, elapsed: Duration },
}

impl ConnectorError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ConnectorError::InvalidInput { message: message.into() }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            ConnectorError::InvalidInput { .. } => None,
            ConnectorError::Connect { elapsed, .. }
            | ConnectorError::Command { elapsed, .. }
            | ConnectorError::Timeout { elapsed, .. }
            | ConnectorError::InvalidResponse { elapsed, .. } => Some(*elapsed),
        }
    }

    pub fn kind(&self) -> PingErrorKind {
        match self {
            ConnectorError::InvalidInput { .. } => PingErrorKind::InvalidInput,
            ConnectorError::Connect { .. } => PingErrorKind::Connect,
            ConnectorError::Command { .. } => PingErrorKind::Command,
            ConnectorError::Timeout { .. } => PingErrorKind::Timeout,
            ConnectorError::InvalidResponse { .. } => PingErrorKind::InvalidResponse,
        }
    }

    /// Only connect-phase failures are worth another attempt; a server that answered wrongly
    /// or hung will do the same again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Connect { .. })
    }
}

/// One liveness attempt against a target.
///
/// Implementations must release the connection on every exit path before returning, and must
/// bound each network wait with the corresponding budget in [`PingOptions`].
#[async_trait]
pub trait Connector: Send + Sync {
    fn protocol(&self) -> ProtocolKind;

    /// Returns the elapsed time from just before connecting to just after the liveness reply.
    async fn ping(&self, connection_string: &str, options: &PingOptions) -> Result<Duration, ConnectorError>;
}

/// The connector to use for each protocol.
#[derive(Clone)]
pub struct Connectors {
    mongodb: Arc<dyn Connector>,
    postgres: Arc<dyn Connector>,
    redis: Arc<dyn Connector>,
}

impl Connectors {
    /// Connectors backed by the real protocol clients.
    pub fn new() -> Self {
        Self {
            mongodb: Arc::new(MongoConnector),
            postgres: Arc::new(PostgresConnector),
            redis: Arc::new(RedisConnector),
        }
    }

    /// Replace the connector for one protocol.
    pub fn with(mut self, protocol: ProtocolKind, connector: Arc<dyn Connector>) -> Self {
        match protocol {
            ProtocolKind::MongoDb => self.mongodb = connector,
            ProtocolKind::Postgres => self.postgres = connector,
            ProtocolKind::Redis => self.redis = connector,
        }
        self
    }

    /// Use the same connector for every protocol (handy for tests).
    pub fn uniform(connector: Arc<dyn Connector>) -> Self {
        Self {
            mongodb: connector.clone(),
            postgres: connector.clone(),
            redis: connector,
        }
    }

    pub fn get(&self, protocol: ProtocolKind) -> &Arc<dyn Connector> {
        match protocol {
            ProtocolKind::MongoDb => &self.mongodb,
            ProtocolKind::Postgres => &self.postgres,
            ProtocolKind::Redis => &self.redis,
        }
    }
}

impl Default for Connectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject connection strings that cannot possibly work before touching the network.
pub(crate) fn validate_connection_string(connection_string: &str, schemes: &[&str]) -> Result<Url, ConnectorError> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(ConnectorError::invalid_input("connection string is empty"));
    }

    let url = Url::parse(trimmed).map_err(|e| ConnectorError::invalid_input(e.to_string()))?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConnectorError::invalid_input(format!(
            "unsupported scheme '{}', expected one of: {}",
            url.scheme(),
            schemes.join(", ")
        )));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConnectorError::invalid_input("connection string has no host"));
    }

    Ok(url)
}

/// Run a graceful close, giving up after `budget`. Dropping the connection afterwards releases
/// the socket without waiting on the peer.
pub(crate) async fn close_within<F>(budget: Duration, close: F)
where
    F: IntoFuture<Output = ()>,
{
    if tokio::time::timeout(budget, close).await.is_err() {
        tracing::debug!(budget_ms = budget.as_millis() as u64, "Graceful close exceeded budget, dropping connection");
    }
}
