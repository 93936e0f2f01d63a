//! Redis liveness: `PING`, expecting `PONG`.

use super::connector::{Connector, ConnectorError, Phase, validate_connection_string};
use super::options::PingOptions;
use super::protocol::ProtocolKind;
use async_trait::async_trait;
use redis::aio::ConnectionLike;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Redis
    }

    async fn ping(&self, connection_string: &str, options: &PingOptions) -> Result<Duration, ConnectorError> {
        validate_connection_string(connection_string, &["redis", "rediss"])?;
        let client = redis::Client::open(connection_string.trim()).map_err(|e| ConnectorError::invalid_input(e.to_string()))?;

        let start = Instant::now();

        let mut conn = match timeout(options.timeout, client.get_multiplexed_tokio_connection()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(ConnectorError::Connect {
                    message: e.to_string(),
                    elapsed: start.elapsed(),
                });
            }
            Err(_) => {
                return Err(ConnectorError::Timeout {
                    phase: Phase::Connect,
                    elapsed: start.elapsed(),
                });
            }
        };

        let reply = timeout(options.command_timeout, conn.req_packed_command(&redis::cmd("PING"))).await;
        let elapsed = start.elapsed();

        // The multiplexed connection's driver task exits once the last handle is dropped.
        drop(conn);

        match reply {
            Ok(Ok(value)) => match redis::from_redis_value::<String>(&value) {
                Ok(pong) if pong == "PONG" => Ok(elapsed),
                Ok(other) => Err(ConnectorError::InvalidResponse {
                    message: format!("expected PONG, got {other:?}"),
                    elapsed,
                }),
                Err(e) => Err(ConnectorError::InvalidResponse {
                    message: e.to_string(),
                    elapsed,
                }),
            },
            Ok(Err(e)) => Err(ConnectorError::Command {
                message: e.to_string(),
                elapsed,
            }),
            Err(_) => Err(ConnectorError::Timeout {
                phase: Phase::Command,
                elapsed,
            }),
        }
    }
}
