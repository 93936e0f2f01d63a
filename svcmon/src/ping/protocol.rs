//! The closed set of protocols the monitor knows how to ping.
//!
//! A service's protocol is resolved once, when the service is registered, from the free-form
//! service-type label the registration flow supplies (e.g. `"Redis Cloud"`, `"MongoDB Atlas"`).
//! From then on every dispatch is an exhaustive match over [`ProtocolKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    MongoDb,
    Postgres,
    Redis,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 3] = [ProtocolKind::MongoDb, ProtocolKind::Postgres, ProtocolKind::Redis];

    /// Canonical lowercase name, as stored in the `services.protocol` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::MongoDb => "mongodb",
            ProtocolKind::Postgres => "postgres",
            ProtocolKind::Redis => "redis",
        }
    }

    /// Resolve a service-type label by case-insensitive substring match.
    ///
    /// `"Managed Redis"` resolves to [`ProtocolKind::Redis`]. Only the substrings `redis`, `mongo`
    /// and `postgres` are recognised; anything else is rejected at registration.
    pub fn from_type_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        if label.contains("redis") {
            Some(ProtocolKind::Redis)
        } else if label.contains("mongo") {
            Some(ProtocolKind::MongoDb)
        } else if label.contains("postgres") {
            Some(ProtocolKind::Postgres)
        } else {
            None
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown protocol: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolKind {
    type Err = UnknownProtocol;

    /// Parse a canonical name (case-insensitive). Also accepts the common aliases clients send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(ProtocolKind::MongoDb),
            "postgres" | "postgresql" => Ok(ProtocolKind::Postgres),
            "redis" => Ok(ProtocolKind::Redis),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProtocolKind {
    type Error = UnknownProtocol;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
