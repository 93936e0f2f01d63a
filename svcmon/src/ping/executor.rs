//! Ping execution for a single service.
//!
//! This module provides the [`PingExecutor`], which resolves the options for a ping, dispatches to
//! the connector for the service's protocol and turns whatever happens into a [`PingResult`].
//! Connect-phase failures are retried with the configured delay, but never past the single hard
//! deadline of `timeout + command_timeout`.

use crate::db::models::{NewPingRecord, Service};
use crate::ping::connector::{Connector, ConnectorError, Connectors, Phase, PingErrorKind};
use crate::ping::options::{PingOptions, PingOverrides, ProtocolOverrides};
use crate::ping::protocol::ProtocolKind;
use crate::types::{ServiceId, abbrev_id};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::instrument;

/// Outcome of one ping, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub service_id: ServiceId,
    pub successful: bool,
    /// Present on success, and on failures where time was spent on the network
    pub response_time_ms: Option<i64>,
    /// Reserved for protocols with a numeric reply status; none of the current ones set it
    pub status_code: Option<i32>,
    /// Present exactly when the ping failed
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<PingErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl PingResult {
    pub fn success(service_id: ServiceId, elapsed: Duration) -> Self {
        Self {
            service_id,
            successful: true,
            response_time_ms: Some(elapsed.as_millis() as i64),
            status_code: None,
            error_message: None,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(service_id: ServiceId, error: &ConnectorError) -> Self {
        Self {
            service_id,
            successful: false,
            response_time_ms: error.elapsed().map(|e| e.as_millis() as i64),
            status_code: None,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            timestamp: Utc::now(),
        }
    }

    /// The history row for this outcome.
    pub fn to_record(&self) -> NewPingRecord {
        NewPingRecord {
            service_id: self.service_id,
            timestamp: self.timestamp,
            successful: self.successful,
            response_time_ms: self.response_time_ms,
            status_code: self.status_code,
            error_message: self.error_message.clone(),
        }
    }
}

/// Runs pings against services using the connector registered for each protocol.
#[derive(Clone)]
pub struct PingExecutor {
    connectors: Connectors,
    overrides: ProtocolOverrides,
}

impl PingExecutor {
    /// `overrides` are the operator's per-protocol settings, applied over the built-in defaults
    /// and under any per-call overrides.
    pub fn new(connectors: Connectors, overrides: ProtocolOverrides) -> Self {
        Self { connectors, overrides }
    }

    pub fn options_for(&self, protocol: ProtocolKind, overrides: &PingOverrides) -> PingOptions {
        let layered = self.overrides.for_protocol(protocol).or(overrides);
        PingOptions::defaults_for(protocol).merged(&layered)
    }

    /// Ping a service. Never fails: every error, including a panicking connector, becomes a
    /// failed [`PingResult`].
    #[instrument(skip_all, fields(service_id = %abbrev_id(&service.id), protocol = %service.protocol))]
    pub async fn execute(&self, service: &Service, overrides: &PingOverrides) -> PingResult {
        let options = self.options_for(service.protocol, overrides);
        let connector = self.connectors.get(service.protocol);
        let deadline = options.hard_deadline();

        let attempt = timeout(deadline, ping_with_retries(connector.as_ref(), &service.connection_url, &options));
        let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ConnectorError::Timeout {
                phase: Phase::Call,
                elapsed: deadline,
            }),
            Err(_) => {
                tracing::error!("Connector panicked during ping");
                Err(ConnectorError::Command {
                    message: "connector panicked".to_string(),
                    elapsed: Duration::ZERO,
                })
            }
        };

        match outcome {
            Ok(elapsed) => {
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Ping succeeded");
                PingResult::success(service.id, elapsed)
            }
            Err(e) => {
                tracing::debug!(error = %e, kind = ?e.kind(), "Ping failed");
                PingResult::failure(service.id, &e)
            }
        }
    }
}

async fn ping_with_retries(
    connector: &dyn Connector,
    connection_string: &str,
    options: &PingOptions,
) -> Result<Duration, ConnectorError> {
    let deadline = Instant::now() + options.hard_deadline();
    let mut attempt_options = *options;
    let mut retries = 0;

    loop {
        match connector.ping(connection_string, &attempt_options).await {
            Err(e) if e.is_retryable() && retries < options.retry_count => {
                let resume_at = Instant::now() + options.retry_delay;
                // The next attempt only gets the connect budget still left before the deadline.
                let connect_budget = deadline
                    .saturating_duration_since(resume_at)
                    .saturating_sub(options.command_timeout)
                    .min(options.timeout);
                if connect_budget.is_zero() {
                    return Err(e);
                }

                retries += 1;
                tracing::debug!(retry = retries, error = %e, "Retrying connection");
                sleep_until(resume_at).await;
                attempt_options.timeout = connect_budget;
            }
            outcome => return outcome,
        }
    }
}
