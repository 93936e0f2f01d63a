//! Liveness checks against monitored endpoints.
//!
//! - [`protocol`]: the closed set of supported protocols
//! - [`options`]: timeouts and retry settings, with per-protocol defaults
//! - [`connector`]: the one-attempt connector contract and its error taxonomy
//! - [`mongodb`], [`postgres`], [`redis`]: the concrete connectors
//! - [`executor`]: option merging, retries, the hard deadline and result shaping

pub mod connector;
pub mod executor;
pub mod mongodb;
pub mod options;
pub mod postgres;
pub mod protocol;
pub mod redis;

pub use connector::{Connector, ConnectorError, Connectors, PingErrorKind};
pub use executor::{PingExecutor, PingResult};
pub use options::{PingOptions, PingOverrides, ProtocolOverrides};
pub use protocol::ProtocolKind;
