//! Background scheduler daemon for pinging due services.
//!
//! This module provides the `PingScheduler`, which runs on the leader replica. It polls the store
//! for services whose next check has come due and runs them as one batch per tick. Each batch is
//! bounded by `batch_timeout`; a batch that overruns is dropped, which aborts its in-flight pings.

use crate::config::SchedulerConfig;
use crate::monitor::batch::BatchSummary;
use crate::monitor::service::PingService;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct PingScheduler {
    service: PingService,
    config: SchedulerConfig,
}

impl PingScheduler {
    pub fn new(service: PingService, config: SchedulerConfig) -> Self {
        Self { service, config }
    }

    /// Run one scheduling pass. Returns `None` when the pass failed or timed out.
    pub async fn run_once(&self) -> Option<BatchSummary> {
        let pass = self.service.process_due(self.config.batch_size, self.config.protocol_filter);

        match timeout(self.config.batch_timeout, pass).await {
            Ok(Ok(summary)) => {
                if summary.total > 0 {
                    tracing::info!(
                        successful = summary.successful,
                        failed = summary.failed,
                        total = summary.total,
                        "Scheduled ping batch complete"
                    );
                }
                Some(summary)
            }
            Ok(Err(e)) => {
                tracing::error!("Scheduled ping batch could not run: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.batch_timeout.as_secs(),
                    "Scheduled ping batch timed out, in-flight pings were cancelled"
                );
                None
            }
        }
    }

    /// Poll until `shutdown` is cancelled. A pass in progress at shutdown is abandoned.
    pub async fn run_daemon(self, shutdown: CancellationToken) {
        tracing::info!(
            "Starting ping scheduler (poll every {}s, batch size {})",
            self.config.poll_interval.as_secs(),
            self.config.batch_size
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.run_once() => {}
            }
        }

        tracing::info!("Ping scheduler stopped");
    }
}
