//! Bounded-concurrency processing of many services.
//!
//! Every service runs in its own task behind a shared semaphore, so a panicking or hung ping
//! only ever costs its own slot. Dropping the future returned by
//! [`BatchProcessor::process_batch`] aborts pings still in flight; a ping that has already
//! finished is still recorded in full.

use crate::db::models::Service;
use crate::monitor::status::{StatusUpdater, UpdateError};
use crate::ping::executor::PingExecutor;
use crate::ping::options::PingOverrides;
use crate::types::abbrev_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, instrument};

/// Default number of pings in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Outcome counts for one batch. `successful + failed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct BatchProcessor {
    executor: PingExecutor,
    updater: StatusUpdater,
    concurrency: usize,
}

impl BatchProcessor {
    pub fn new(executor: PingExecutor, updater: StatusUpdater, concurrency: usize) -> Self {
        Self {
            executor,
            updater,
            concurrency: concurrency.max(1),
        }
    }

    /// Ping and update every service. Counts follow the ping outcome: a successful ping whose
    /// bookkeeping could not be saved still counts as successful, and a task that panicked
    /// counts as failed.
    #[instrument(skip_all, fields(total = services.len(), concurrency = self.concurrency))]
    pub async fn process_batch(&self, services: Vec<Service>, overrides: &PingOverrides) -> BatchSummary {
        let total = services.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<bool> = JoinSet::new();

        for service in services {
            let semaphore = semaphore.clone();
            let executor = self.executor.clone();
            let updater = self.updater.clone();
            let overrides = *overrides;
            let span = tracing::debug_span!("batch_item", service_id = %abbrev_id(&service.id));

            join_set.spawn(
                async move {
                    // The semaphore is never closed
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return false;
                    };

                    let result = executor.execute(&service, &overrides).await;
                    let successful = result.successful;

                    // Recording runs in its own task, so aborting the batch cannot stop it
                    // between the history append and the service update.
                    let recording = tokio::spawn(async move { updater.apply(&result).await }.in_current_span());
                    match recording.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(UpdateError::ServiceNotFound(id))) => {
                            tracing::info!(service_id = %id, "Service removed before its ping could be recorded");
                        }
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "Failed to record ping outcome");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Recording task did not complete");
                        }
                    }
                    successful
                }
                .instrument(span),
            );
        }

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(true) => summary.successful += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Ping task did not complete");
                    summary.failed += 1;
                }
            }
        }

        tracing::debug!(
            successful = summary.successful,
            failed = summary.failed,
            "Batch complete"
        );
        summary
    }
}
