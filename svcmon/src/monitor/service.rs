//! Entry points used by the HTTP layer and the scheduler.

use crate::db::errors::DbError;
use crate::db::models::{PingRecord, Service};
use crate::db::store::ServiceStore;
use crate::errors::Error;
use crate::monitor::batch::{BatchProcessor, BatchSummary};
use crate::monitor::status::{StatusUpdater, UpdateError};
use crate::ping::executor::{PingExecutor, PingResult};
use crate::ping::options::PingOverrides;
use crate::ping::protocol::ProtocolKind;
use crate::types::{ServiceId, UserId, abbrev_id};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Why a due batch could not run.
#[derive(Debug, ThisError)]
pub enum TriggerError {
    #[error("Batch size must be between 1 and {max}, got {requested}")]
    InvalidBatchSize { requested: i64, max: i64 },

    #[error("Failed to select services due for a check: {0}")]
    Selection(#[source] DbError),
}

/// Ties the store, executor, updater and batch processor together.
#[derive(Clone)]
pub struct PingService {
    store: Arc<dyn ServiceStore>,
    executor: PingExecutor,
    updater: StatusUpdater,
    processor: BatchProcessor,
    max_batch_size: i64,
}

impl PingService {
    pub fn new(store: Arc<dyn ServiceStore>, executor: PingExecutor, concurrency: usize, max_batch_size: i64) -> Self {
        let updater = StatusUpdater::new(store.clone());
        let processor = BatchProcessor::new(executor.clone(), updater.clone(), concurrency);
        Self {
            store,
            executor,
            updater,
            processor,
            max_batch_size,
        }
    }

    pub fn store(&self) -> &Arc<dyn ServiceStore> {
        &self.store
    }

    /// Run one batch of due services on behalf of an external trigger.
    pub async fn run_due_batch(&self, batch_size: i64, protocol: Option<ProtocolKind>) -> Result<BatchSummary, TriggerError> {
        if !(1..=self.max_batch_size).contains(&batch_size) {
            return Err(TriggerError::InvalidBatchSize {
                requested: batch_size,
                max: self.max_batch_size,
            });
        }
        self.process_due(batch_size, protocol).await
    }

    /// Select up to `limit` due services and process them.
    pub async fn process_due(&self, limit: i64, protocol: Option<ProtocolKind>) -> Result<BatchSummary, TriggerError> {
        let due = self
            .store
            .find_services_due_for_check(protocol, limit, Utc::now())
            .await
            .map_err(TriggerError::Selection)?;

        if due.is_empty() {
            return Ok(BatchSummary::default());
        }

        tracing::info!(count = due.len(), protocol = ?protocol, "Processing due services");
        Ok(self.processor.process_batch(due, &PingOverrides::default()).await)
    }

    /// Ping every service the user owns, optionally restricted to one protocol.
    pub async fn ping_user_services(&self, user_id: UserId, protocol: Option<ProtocolKind>) -> Result<BatchSummary, Error> {
        let services = self.store.find_services_for_user(user_id, protocol).await?;
        Ok(self.processor.process_batch(services, &PingOverrides::default()).await)
    }

    /// Ping one service the user owns and record the outcome.
    ///
    /// The ping result is returned even if recording it failed; the failure is logged.
    pub async fn ping_service_for_user(&self, user_id: UserId, service_id: ServiceId) -> Result<PingResult, Error> {
        let service = self.owned_service(user_id, service_id).await?;
        let result = self.executor.execute(&service, &PingOverrides::default()).await;

        match self.updater.apply(&result).await {
            Ok(_) => {}
            Err(UpdateError::ServiceNotFound(_)) => {
                tracing::info!(service_id = %abbrev_id(&service_id), "Service removed while it was being pinged");
            }
            Err(e) => tracing::error!(service_id = %abbrev_id(&service_id), error = %e, "Failed to record ping outcome"),
        }

        Ok(result)
    }

    /// Most recent pings for a service the user owns.
    pub async fn ping_history(&self, user_id: UserId, service_id: ServiceId, limit: i64) -> Result<Vec<PingRecord>, Error> {
        self.owned_service(user_id, service_id).await?;
        Ok(self.store.list_ping_records(service_id, limit).await?)
    }

    /// Services owned by someone else are reported as missing.
    async fn owned_service(&self, user_id: UserId, service_id: ServiceId) -> Result<Service, Error> {
        match self.store.find_service(service_id).await? {
            Some(service) if service.user_id == user_id => Ok(service),
            _ => Err(Error::NotFound {
                resource: "Service".to_string(),
                id: service_id.to_string(),
            }),
        }
    }
}
