//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`ServiceId`]: Monitored service identifier
//! - [`UserId`]: Owning user, resolved by the identity provider in front of this service
//! - [`PingRecordId`]: Ping history row identifier
//! - [`LogEntryId`]: Audit log row identifier

use uuid::Uuid;

pub type ServiceId = Uuid;
pub type UserId = Uuid;
pub type PingRecordId = Uuid;
pub type LogEntryId = Uuid;

/// Short, human-friendly form of an id for log lines.
pub fn abbrev_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
