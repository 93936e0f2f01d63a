//! Ping options and per-protocol defaults.
//!
//! Callers supply a sparse [`PingOverrides`]; the executor merges it field-by-field over the
//! protocol's [`PingOptions::defaults_for`] (caller wins per field).

use super::protocol::ProtocolKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fully resolved options for one ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOptions {
    /// Budget for establishing the connection
    pub timeout: Duration,
    /// Extra connection attempts after a connect-phase failure
    pub retry_count: u32,
    /// Pause between connection attempts
    pub retry_delay: Duration,
    /// Budget for the liveness command once connected
    pub command_timeout: Duration,
}

impl PingOptions {
    /// Built-in defaults per protocol.
    pub fn defaults_for(protocol: ProtocolKind) -> Self {
        match protocol {
            ProtocolKind::MongoDb | ProtocolKind::Postgres => Self {
                timeout: Duration::from_millis(30_000),
                retry_count: 2,
                retry_delay: Duration::from_millis(1_000),
                command_timeout: Duration::from_millis(10_000),
            },
            ProtocolKind::Redis => Self {
                timeout: Duration::from_millis(10_000),
                retry_count: 2,
                retry_delay: Duration::from_millis(1_000),
                command_timeout: Duration::from_millis(5_000),
            },
        }
    }

    /// Hard upper bound for a whole connector call, cleanup included.
    pub fn hard_deadline(&self) -> Duration {
        self.timeout + self.command_timeout
    }

    /// Apply caller overrides on top of these options.
    pub fn merged(self, overrides: &PingOverrides) -> Self {
        Self {
            timeout: overrides.timeout_ms.map(Duration::from_millis).unwrap_or(self.timeout),
            retry_count: overrides.retry_count.unwrap_or(self.retry_count),
            retry_delay: overrides.retry_delay_ms.map(Duration::from_millis).unwrap_or(self.retry_delay),
            command_timeout: overrides
                .command_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.command_timeout),
        }
    }
}

/// Sparse, caller-supplied options. `None` means "use the protocol default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
pub struct PingOverrides {
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
}

impl PingOverrides {
    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn or(self, other: &PingOverrides) -> Self {
        Self {
            timeout_ms: other.timeout_ms.or(self.timeout_ms),
            retry_count: other.retry_count.or(self.retry_count),
            retry_delay_ms: other.retry_delay_ms.or(self.retry_delay_ms),
            command_timeout_ms: other.command_timeout_ms.or(self.command_timeout_ms),
        }
    }

    /// Zero timeouts would turn every ping into an immediate timeout.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.command_timeout_ms == Some(0) {
            return Err("command_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Operator-level overrides, one set per protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolOverrides {
    pub mongodb: PingOverrides,
    pub postgres: PingOverrides,
    pub redis: PingOverrides,
}

impl ProtocolOverrides {
    pub fn for_protocol(&self, protocol: ProtocolKind) -> &PingOverrides {
        match protocol {
            ProtocolKind::MongoDb => &self.mongodb,
            ProtocolKind::Postgres => &self.postgres,
            ProtocolKind::Redis => &self.redis,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for protocol in ProtocolKind::ALL {
            self.for_protocol(protocol)
                .validate()
                .map_err(|e| format!("ping.{protocol}: {e}"))?;
        }
        Ok(())
    }
}
