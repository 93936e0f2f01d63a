//! The persistence collaborator the monitor reads from and writes to.

use crate::db::errors::Result;
use crate::db::models::{LogEntry, NewLogEntry, NewPingRecord, NewService, PingCounts, PingRecord, Service, ServiceUpdate};
use crate::ping::protocol::ProtocolKind;
use crate::types::{ServiceId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage for services, their ping history and the audit log.
///
/// Every call is an independent read or write; the monitor does read-modify-write on the
/// service row without holding locks, so concurrent updates to one service are last-writer-wins.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Register a new service. Fails with [`DbError::InvalidValue`](crate::db::errors::DbError)
    /// when the service-type label does not name a supported protocol.
    async fn create_service(&self, new: &NewService) -> Result<Service>;

    async fn find_service(&self, id: ServiceId) -> Result<Option<Service>>;

    /// Services whose next check is unset or at or before `now`, never-checked services first,
    /// capped at `limit`.
    async fn find_services_due_for_check(
        &self,
        protocol: Option<ProtocolKind>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Service>>;

    /// All services owned by `user_id`, optionally restricted to one protocol.
    async fn find_services_for_user(&self, user_id: UserId, protocol: Option<ProtocolKind>) -> Result<Vec<Service>>;

    /// Write the post-ping fields. Fails with `NotFound` if the service no longer exists.
    async fn update_service(&self, id: ServiceId, update: &ServiceUpdate) -> Result<Service>;

    async fn append_ping_record(&self, record: &NewPingRecord) -> Result<PingRecord>;

    /// Total and successful ping counts over the service's full history.
    async fn count_ping_records(&self, service_id: ServiceId) -> Result<PingCounts>;

    /// Most recent pings first.
    async fn list_ping_records(&self, service_id: ServiceId, limit: i64) -> Result<Vec<PingRecord>>;

    async fn append_log(&self, entry: &NewLogEntry) -> Result<LogEntry>;
}
