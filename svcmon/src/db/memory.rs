//! In-process [`ServiceStore`] for tests and single-node embedding.

use crate::db::errors::{DbError, Result};
use crate::db::models::{
    LogEntry, NewLogEntry, NewPingRecord, NewService, PingCounts, PingRecord, Service, ServiceStatus, ServiceUpdate,
};
use crate::db::store::ServiceStore;
use crate::ping::protocol::ProtocolKind;
use crate::types::{ServiceId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    services: HashMap<ServiceId, Service>,
    ping_records: Vec<PingRecord>,
    logs: Vec<LogEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed service row, bypassing registration defaults.
    pub fn insert_service(&self, service: Service) {
        self.tables.write().services.insert(service.id, service);
    }

    /// Every stored ping for a service, oldest first.
    pub fn ping_records(&self, service_id: ServiceId) -> Vec<PingRecord> {
        self.tables
            .read()
            .ping_records
            .iter()
            .filter(|r| r.service_id == service_id)
            .cloned()
            .collect()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.tables.read().logs.clone()
    }
}

#[async_trait]
impl ServiceStore for InMemoryStore {
    async fn create_service(&self, new: &NewService) -> Result<Service> {
        let protocol = new.protocol().ok_or_else(|| DbError::InvalidValue {
            column: "service_type",
            value: new.service_type.clone(),
        })?;
        let now = Utc::now();

        let service = Service {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            name: new.name.clone(),
            connection_url: new.connection_url.clone(),
            service_type: new.service_type.clone(),
            protocol,
            status: ServiceStatus::Offline,
            consecutive_failures: 0,
            failures_threshold: new.failures_threshold(),
            disabled_on_consecutive_failure: new.disabled_on_consecutive_failure,
            uptime_percentage: 0.0,
            ping_interval_seconds: new.ping_interval_seconds(),
            last_successful_check: None,
            last_failed_check: None,
            next_scheduled_check: None,
            created_at: now,
            updated_at: now,
        };

        self.tables.write().services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn find_service(&self, id: ServiceId) -> Result<Option<Service>> {
        Ok(self.tables.read().services.get(&id).cloned())
    }

    async fn find_services_due_for_check(
        &self,
        protocol: Option<ProtocolKind>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Service>> {
        let tables = self.tables.read();
        let mut due: Vec<Service> = tables
            .services
            .values()
            .filter(|s| s.is_due(now))
            .filter(|s| protocol.is_none_or(|p| s.protocol == p))
            .cloned()
            .collect();

        // None sorts before Some, matching NULLS FIRST
        due.sort_by_key(|s| (s.next_scheduled_check, s.id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn find_services_for_user(&self, user_id: UserId, protocol: Option<ProtocolKind>) -> Result<Vec<Service>> {
        let tables = self.tables.read();
        let mut owned: Vec<Service> = tables
            .services
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| protocol.is_none_or(|p| s.protocol == p))
            .cloned()
            .collect();

        owned.sort_by_key(|s| (s.created_at, s.id));
        Ok(owned)
    }

    async fn update_service(&self, id: ServiceId, update: &ServiceUpdate) -> Result<Service> {
        let mut tables = self.tables.write();
        let service = tables.services.get_mut(&id).ok_or(DbError::NotFound)?;

        service.status = update.status;
        service.consecutive_failures = update.consecutive_failures;
        service.uptime_percentage = update.uptime_percentage;
        if let Some(at) = update.last_successful_check {
            service.last_successful_check = Some(at);
        }
        if let Some(at) = update.last_failed_check {
            service.last_failed_check = Some(at);
        }
        service.next_scheduled_check = Some(update.next_scheduled_check);
        service.updated_at = Utc::now();

        Ok(service.clone())
    }

    async fn append_ping_record(&self, record: &NewPingRecord) -> Result<PingRecord> {
        let stored = PingRecord {
            id: Uuid::new_v4(),
            service_id: record.service_id,
            timestamp: record.timestamp,
            successful: record.successful,
            response_time_ms: record.response_time_ms,
            status_code: record.status_code,
            error_message: record.error_message.clone(),
        };

        let mut tables = self.tables.write();
        if !tables.services.contains_key(&record.service_id) {
            return Err(DbError::NotFound);
        }
        tables.ping_records.push(stored.clone());
        Ok(stored)
    }

    async fn count_ping_records(&self, service_id: ServiceId) -> Result<PingCounts> {
        let tables = self.tables.read();
        let counts = tables
            .ping_records
            .iter()
            .filter(|r| r.service_id == service_id)
            .fold(PingCounts::default(), |mut acc, r| {
                acc.total += 1;
                if r.successful {
                    acc.successful += 1;
                }
                acc
            });
        Ok(counts)
    }

    async fn list_ping_records(&self, service_id: ServiceId, limit: i64) -> Result<Vec<PingRecord>> {
        let mut records = self.ping_records(service_id);
        // Stable sort keeps insertion order for equal timestamps; reverse puts newest first
        records.sort_by_key(|r| r.timestamp);
        records.reverse();
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }

    async fn append_log(&self, entry: &NewLogEntry) -> Result<LogEntry> {
        let stored = LogEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            service_id: entry.service_id,
            service_name: entry.service_name.clone(),
            severity: entry.severity.to_string(),
            category: entry.category.to_string(),
            action_type: entry.action_type.to_string(),
            status: entry.status.to_string(),
            message: entry.message.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().logs.push(stored.clone());
        Ok(stored)
    }
}
