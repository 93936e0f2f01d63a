//! Database records for monitored services, their ping history and the audit log.

use crate::db::errors::DbError;
use crate::ping::protocol::ProtocolKind;
use crate::types::{LogEntryId, PingRecordId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Ping interval given to services registered without one.
pub const DEFAULT_PING_INTERVAL_SECONDS: i32 = 300;

/// Failure threshold given to services registered without one.
pub const DEFAULT_FAILURES_THRESHOLD: i32 = 3;

/// Reachability state of a monitored service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Online,
    Offline,
    /// Auto-disabled after too many consecutive failures. Still pinged; a success brings the
    /// service back online.
    Disabled,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Online => "ONLINE",
            ServiceStatus::Offline => "OFFLINE",
            ServiceStatus::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(ServiceStatus::Online),
            "OFFLINE" => Ok(ServiceStatus::Offline),
            "DISABLED" => Ok(ServiceStatus::Disabled),
            other => Err(DbError::InvalidValue {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ServiceStatus {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A monitored endpoint owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: ServiceId,
    pub user_id: UserId,
    pub name: String,
    /// Connection string handed to the connector verbatim. Never serialized to API clients.
    #[serde(skip_serializing)]
    pub connection_url: String,
    /// Free-form label from registration, e.g. "Redis Cloud"
    pub service_type: String,
    /// Resolved from `service_type` when the service was registered
    #[sqlx(try_from = "String")]
    pub protocol: ProtocolKind,
    #[sqlx(try_from = "String")]
    pub status: ServiceStatus,
    pub consecutive_failures: i32,
    pub failures_threshold: i32,
    pub disabled_on_consecutive_failure: bool,
    /// 0 to 100
    pub uptime_percentage: f64,
    pub ping_interval_seconds: i32,
    pub last_successful_check: Option<DateTime<Utc>>,
    pub last_failed_check: Option<DateTime<Utc>>,
    /// `None` means the service has never been checked and is due now
    pub next_scheduled_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Whether the service should be picked up by a scheduling pass at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_scheduled_check.is_none_or(|next| next <= now)
    }
}

/// Fields written back after a ping. Only one of the two check timestamps is ever set.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUpdate {
    pub status: ServiceStatus,
    pub consecutive_failures: i32,
    pub uptime_percentage: f64,
    pub last_successful_check: Option<DateTime<Utc>>,
    pub last_failed_check: Option<DateTime<Utc>>,
    pub next_scheduled_check: DateTime<Utc>,
}

/// Registration request for a new service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub user_id: UserId,
    pub name: String,
    pub connection_url: String,
    pub service_type: String,
    pub failures_threshold: Option<i32>,
    #[serde(default)]
    pub disabled_on_consecutive_failure: bool,
    pub ping_interval_seconds: Option<i32>,
}

impl NewService {
    /// Resolve the protocol from the service-type label.
    pub fn protocol(&self) -> Option<ProtocolKind> {
        ProtocolKind::from_type_label(&self.service_type)
    }

    pub fn failures_threshold(&self) -> i32 {
        self.failures_threshold.unwrap_or(DEFAULT_FAILURES_THRESHOLD)
    }

    pub fn ping_interval_seconds(&self) -> i32 {
        self.ping_interval_seconds.unwrap_or(DEFAULT_PING_INTERVAL_SECONDS)
    }
}

/// A stored ping outcome. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PingRecord {
    pub id: PingRecordId,
    pub service_id: ServiceId,
    pub timestamp: DateTime<Utc>,
    pub successful: bool,
    pub response_time_ms: Option<i64>,
    pub status_code: Option<i32>,
    pub error_message: Option<String>,
}

/// A ping outcome about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPingRecord {
    pub service_id: ServiceId,
    pub timestamp: DateTime<Utc>,
    pub successful: bool,
    pub response_time_ms: Option<i64>,
    pub status_code: Option<i32>,
    pub error_message: Option<String>,
}

/// Totals over a service's ping history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingCounts {
    pub total: i64,
    pub successful: i64,
}

/// An audit log entry. Only written when a service is auto-disabled.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogEntry {
    pub id: LogEntryId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub severity: String,
    pub category: String,
    pub action_type: String,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub severity: &'static str,
    pub category: &'static str,
    pub action_type: &'static str,
    pub status: &'static str,
    pub message: String,
}
