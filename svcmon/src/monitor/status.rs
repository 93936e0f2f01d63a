//! Post-ping bookkeeping: status, consecutive failures, uptime and the next check time.
//!
//! [`compute_transition`] is the pure state machine; [`StatusUpdater::apply`] wraps it in the
//! read-modify-write against the store.

use crate::db::errors::DbError;
use crate::db::models::{NewLogEntry, PingCounts, Service, ServiceStatus, ServiceUpdate};
use crate::db::store::ServiceStore;
use crate::ping::executor::PingResult;
use crate::types::{ServiceId, abbrev_id};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub const AUTO_DISABLE_ACTION: &str = "AUTO_DISABLE";

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The service was deleted between selection and update
    #[error("Service {0} not found")]
    ServiceNotFound(ServiceId),

    #[error("Failed to persist ping outcome: {0}")]
    Persistence(#[from] DbError),
}

/// The new service state after one ping.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub update: ServiceUpdate,
    /// Set when this ping moved the service into `DISABLED`
    pub disabled: bool,
}

/// Compute the service state after a ping.
///
/// `prior` covers the history before this ping. The first-ever ping keeps the previous uptime;
/// after that uptime counts this ping along with everything before it.
pub fn compute_transition(service: &Service, successful: bool, prior: PingCounts, now: DateTime<Utc>) -> Transition {
    let (status, consecutive_failures) = if successful {
        (ServiceStatus::Online, 0)
    } else {
        let failures = service.consecutive_failures.saturating_add(1);
        let disable = service.disabled_on_consecutive_failure && failures >= service.failures_threshold;
        (if disable { ServiceStatus::Disabled } else { ServiceStatus::Offline }, failures)
    };

    let uptime_percentage = if prior.total > 0 {
        let successes = prior.successful + i64::from(successful);
        successes as f64 / (prior.total + 1) as f64 * 100.0
    } else {
        service.uptime_percentage
    };

    Transition {
        disabled: status == ServiceStatus::Disabled && service.status != ServiceStatus::Disabled,
        update: ServiceUpdate {
            status,
            consecutive_failures,
            uptime_percentage,
            last_successful_check: successful.then_some(now),
            last_failed_check: (!successful).then_some(now),
            next_scheduled_check: now + Duration::seconds(i64::from(service.ping_interval_seconds)),
        },
    }
}

/// Applies ping outcomes to stored services.
#[derive(Clone)]
pub struct StatusUpdater {
    store: Arc<dyn ServiceStore>,
}

impl StatusUpdater {
    pub fn new(store: Arc<dyn ServiceStore>) -> Self {
        Self { store }
    }

    /// Record a ping and update the service it belongs to. Returns the updated service.
    ///
    /// History is counted before this ping is appended, so a service's first ping leaves its
    /// uptime alone.
    #[instrument(skip_all, fields(service_id = %abbrev_id(&result.service_id), successful = result.successful), err)]
    pub async fn apply(&self, result: &PingResult) -> Result<Service, UpdateError> {
        let now = Utc::now();

        let service = self
            .store
            .find_service(result.service_id)
            .await?
            .ok_or(UpdateError::ServiceNotFound(result.service_id))?;

        let prior = self.store.count_ping_records(service.id).await?;
        let transition = compute_transition(&service, result.successful, prior, now);

        self.store.append_ping_record(&result.to_record()).await?;
        let updated = match self.store.update_service(service.id, &transition.update).await {
            Err(DbError::NotFound) => return Err(UpdateError::ServiceNotFound(service.id)),
            other => other?,
        };

        if transition.disabled {
            tracing::warn!(
                failures = updated.consecutive_failures,
                threshold = service.failures_threshold,
                "Service auto-disabled"
            );
            self.store
                .append_log(&NewLogEntry {
                    user_id: service.user_id,
                    service_id: service.id,
                    service_name: service.name.clone(),
                    severity: "WARNING",
                    category: "SERVICE",
                    action_type: AUTO_DISABLE_ACTION,
                    status: "FAILURE",
                    message: format!(
                        "Service automatically disabled after {} consecutive failures",
                        updated.consecutive_failures
                    ),
                })
                .await?;
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::ping::connector::ConnectorError;
    use crate::test_utils::{FailingStore, sample_service};
    use std::time::Duration as StdDuration;

    fn ok(service_id: ServiceId) -> PingResult {
        PingResult::success(service_id, StdDuration::from_millis(3))
    }

    fn failed(service_id: ServiceId) -> PingResult {
        PingResult::failure(
            service_id,
            &ConnectorError::Connect {
                message: "connection refused".into(),
                elapsed: StdDuration::from_millis(1),
            },
        )
    }

    fn updater_with(service: Service) -> (Arc<InMemoryStore>, StatusUpdater) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_service(service);
        (store.clone(), StatusUpdater::new(store))
    }

    #[test]
    fn failure_without_auto_disable_never_disables() {
        let mut service = sample_service();
        service.disabled_on_consecutive_failure = false;
        service.consecutive_failures = 50;
        service.failures_threshold = 1;

        let transition = compute_transition(&service, false, PingCounts { total: 50, successful: 0 }, Utc::now());

        assert_eq!(transition.update.status, ServiceStatus::Offline);
        assert_eq!(transition.update.consecutive_failures, 51);
        assert!(!transition.disabled);
    }

    #[test]
    fn success_resets_a_disabled_service() {
        let mut service = sample_service();
        service.status = ServiceStatus::Disabled;
        service.consecutive_failures = 7;
        service.disabled_on_consecutive_failure = true;

        let transition = compute_transition(&service, true, PingCounts { total: 7, successful: 0 }, Utc::now());

        assert_eq!(transition.update.status, ServiceStatus::Online);
        assert_eq!(transition.update.consecutive_failures, 0);
        assert!(transition.update.last_successful_check.is_some());
        assert!(transition.update.last_failed_check.is_none());
    }

    #[test]
    fn next_check_is_now_plus_interval_regardless_of_outcome() {
        let mut service = sample_service();
        service.ping_interval_seconds = 90;
        let now = Utc::now();

        for successful in [true, false] {
            let transition = compute_transition(&service, successful, PingCounts { total: 1, successful: 1 }, now);
            assert_eq!(transition.update.next_scheduled_check, now + Duration::seconds(90));
        }
    }

    #[test]
    fn uptime_counts_this_ping_on_top_of_history() {
        let service = sample_service();

        let up = compute_transition(&service, true, PingCounts { total: 3, successful: 2 }, Utc::now());
        let down = compute_transition(&service, false, PingCounts { total: 3, successful: 2 }, Utc::now());

        assert_eq!(up.update.uptime_percentage, 75.0);
        assert_eq!(down.update.uptime_percentage, 50.0);
    }

    #[test]
    fn empty_history_keeps_previous_uptime() {
        let mut service = sample_service();
        service.uptime_percentage = 42.5;

        let transition = compute_transition(&service, true, PingCounts::default(), Utc::now());

        assert_eq!(transition.update.uptime_percentage, 42.5);
    }

    #[test]
    fn staying_disabled_is_not_a_new_transition() {
        let mut service = sample_service();
        service.status = ServiceStatus::Disabled;
        service.disabled_on_consecutive_failure = true;
        service.failures_threshold = 3;
        service.consecutive_failures = 3;

        let transition = compute_transition(&service, false, PingCounts { total: 3, successful: 0 }, Utc::now());

        assert_eq!(transition.update.status, ServiceStatus::Disabled);
        assert!(!transition.disabled);
    }

    #[tokio::test]
    async fn third_failure_disables_and_logs_once() {
        let mut service = sample_service();
        service.failures_threshold = 3;
        service.disabled_on_consecutive_failure = true;
        service.consecutive_failures = 2;
        service.status = ServiceStatus::Offline;
        let (store, updater) = updater_with(service.clone());

        let updated = updater.apply(&failed(service.id)).await.unwrap();

        assert_eq!(updated.status, ServiceStatus::Disabled);
        assert_eq!(updated.consecutive_failures, 3);
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, "AUTO_DISABLE");
        assert_eq!(logs[0].severity, "WARNING");
        assert_eq!(logs[0].message, "Service automatically disabled after 3 consecutive failures");

        // Further failures keep it disabled without another log entry
        updater.apply(&failed(service.id)).await.unwrap();
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn uptime_is_successes_over_total() {
        let service = sample_service();
        let (store, updater) = updater_with(service.clone());

        let mut last = None;
        for result in [ok(service.id), failed(service.id), ok(service.id), ok(service.id)] {
            last = Some(updater.apply(&result).await.unwrap());
        }

        assert_eq!(last.unwrap().uptime_percentage, 75.0);
        assert_eq!(store.ping_records(service.id).len(), 4);
    }

    #[tokio::test]
    async fn first_ever_ping_keeps_previous_uptime() {
        let mut service = sample_service();
        service.uptime_percentage = 42.5;
        let (store, updater) = updater_with(service.clone());

        let first = updater.apply(&ok(service.id)).await.unwrap();
        assert_eq!(first.uptime_percentage, 42.5);
        assert_eq!(first.status, ServiceStatus::Online);
        assert_eq!(store.ping_records(service.id).len(), 1);

        // From the second ping on, uptime follows the recorded history
        let second = updater.apply(&failed(service.id)).await.unwrap();
        assert_eq!(second.uptime_percentage, 50.0);
    }

    #[tokio::test]
    async fn identical_pings_are_both_recorded() {
        let service = sample_service();
        let (store, updater) = updater_with(service.clone());

        updater.apply(&failed(service.id)).await.unwrap();
        let latest = updater.apply(&ok(service.id)).await.unwrap();

        assert_eq!(store.ping_records(service.id).len(), 2);
        assert_eq!(latest.status, ServiceStatus::Online);
        assert!(latest.last_failed_check.is_some());
        assert!(latest.last_successful_check.is_some());
    }

    #[tokio::test]
    async fn missing_service_is_reported_not_created() {
        let (store, updater) = updater_with(sample_service());
        let stranger = ServiceId::new_v4();

        let err = updater.apply(&ok(stranger)).await.unwrap_err();

        assert!(matches!(err, UpdateError::ServiceNotFound(id) if id == stranger));
        assert!(store.ping_records(stranger).is_empty());
    }

    #[tokio::test]
    async fn store_failures_surface_as_persistence_errors() {
        let service = sample_service();
        let store = Arc::new(FailingStore::new());
        store.inner.insert_service(service.clone());
        store.fail_writes(true);

        let err = StatusUpdater::new(store).apply(&ok(service.id)).await.unwrap_err();

        assert!(matches!(err, UpdateError::Persistence(_)));
    }
}
