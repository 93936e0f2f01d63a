//! PostgreSQL-backed [`ServiceStore`].

use crate::db::errors::{DbError, Result};
use crate::db::models::{LogEntry, NewLogEntry, NewPingRecord, NewService, PingCounts, PingRecord, Service, ServiceUpdate};
use crate::db::store::ServiceStore;
use crate::ping::protocol::ProtocolKind;
use crate::types::{ServiceId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

const SERVICE_COLUMNS: &str = "id, user_id, name, connection_url, service_type, protocol, status, \
     consecutive_failures, failures_threshold, disabled_on_consecutive_failure, uptime_percentage, \
     ping_interval_seconds, last_successful_check, last_failed_check, next_scheduled_check, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ServiceStore for PostgresStore {
    #[instrument(skip(self, new), fields(service_type = %new.service_type), err)]
    async fn create_service(&self, new: &NewService) -> Result<Service> {
        let protocol = new.protocol().ok_or_else(|| DbError::InvalidValue {
            column: "service_type",
            value: new.service_type.clone(),
        })?;

        let service = sqlx::query_as::<_, Service>(&format!(
            "INSERT INTO services (user_id, name, connection_url, service_type, protocol, \
                 failures_threshold, disabled_on_consecutive_failure, ping_interval_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.connection_url)
        .bind(&new.service_type)
        .bind(protocol.as_str())
        .bind(new.failures_threshold())
        .bind(new.disabled_on_consecutive_failure)
        .bind(new.ping_interval_seconds())
        .fetch_one(&self.pool)
        .await?;

        Ok(service)
    }

    async fn find_service(&self, id: ServiceId) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(service)
    }

    #[instrument(skip(self), err)]
    async fn find_services_due_for_check(
        &self,
        protocol: Option<ProtocolKind>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services \
             WHERE (next_scheduled_check IS NULL OR next_scheduled_check <= $1) \
               AND ($2::text IS NULL OR protocol = $2) \
             ORDER BY next_scheduled_check ASC NULLS FIRST, id \
             LIMIT $3"
        ))
        .bind(now)
        .bind(protocol.map(|p| p.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    async fn find_services_for_user(&self, user_id: UserId, protocol: Option<ProtocolKind>) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services \
             WHERE user_id = $1 AND ($2::text IS NULL OR protocol = $2) \
             ORDER BY created_at, id"
        ))
        .bind(user_id)
        .bind(protocol.map(|p| p.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    async fn update_service(&self, id: ServiceId, update: &ServiceUpdate) -> Result<Service> {
        // COALESCE keeps whichever check timestamp this ping did not touch.
        let service = sqlx::query_as::<_, Service>(&format!(
            "UPDATE services SET \
                 status = $2, \
                 consecutive_failures = $3, \
                 uptime_percentage = $4, \
                 last_successful_check = COALESCE($5, last_successful_check), \
                 last_failed_check = COALESCE($6, last_failed_check), \
                 next_scheduled_check = $7, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.consecutive_failures)
        .bind(update.uptime_percentage)
        .bind(update.last_successful_check)
        .bind(update.last_failed_check)
        .bind(update.next_scheduled_check)
        .fetch_optional(&self.pool)
        .await?;

        service.ok_or(DbError::NotFound)
    }

    async fn append_ping_record(&self, record: &NewPingRecord) -> Result<PingRecord> {
        let stored = sqlx::query_as::<_, PingRecord>(
            "INSERT INTO ping_records (service_id, timestamp, successful, response_time_ms, status_code, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, service_id, timestamp, successful, response_time_ms, status_code, error_message",
        )
        .bind(record.service_id)
        .bind(record.timestamp)
        .bind(record.successful)
        .bind(record.response_time_ms)
        .bind(record.status_code)
        .bind(&record.error_message)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn count_ping_records(&self, service_id: ServiceId) -> Result<PingCounts> {
        let (total, successful) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE successful) FROM ping_records WHERE service_id = $1",
        )
        .bind(service_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PingCounts { total, successful })
    }

    async fn list_ping_records(&self, service_id: ServiceId, limit: i64) -> Result<Vec<PingRecord>> {
        let records = sqlx::query_as::<_, PingRecord>(
            "SELECT id, service_id, timestamp, successful, response_time_ms, status_code, error_message \
             FROM ping_records WHERE service_id = $1 \
             ORDER BY timestamp DESC, id \
             LIMIT $2",
        )
        .bind(service_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn append_log(&self, entry: &NewLogEntry) -> Result<LogEntry> {
        let stored = sqlx::query_as::<_, LogEntry>(
            "INSERT INTO logs (user_id, service_id, service_name, severity, category, action_type, status, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, user_id, service_id, service_name, severity, category, action_type, status, message, created_at",
        )
        .bind(entry.user_id)
        .bind(entry.service_id)
        .bind(&entry.service_name)
        .bind(entry.severity)
        .bind(entry.category)
        .bind(entry.action_type)
        .bind(entry.status)
        .bind(&entry.message)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }
}
