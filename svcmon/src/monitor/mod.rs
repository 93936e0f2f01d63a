//! The health-check pipeline: select due services, ping them, record the outcome.
//!
//! - [`status`]: per-ping state transitions and their persistence
//! - [`batch`]: bounded-concurrency processing of many services
//! - [`service`]: trigger and user-scoped entry points
//! - [`scheduler`]: the background polling daemon

pub mod batch;
pub mod scheduler;
pub mod service;
pub mod status;

pub use batch::{BatchProcessor, BatchSummary};
pub use scheduler::PingScheduler;
pub use service::{PingService, TriggerError};
pub use status::{StatusUpdater, UpdateError};
