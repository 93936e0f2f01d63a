//! PostgreSQL liveness: `SELECT 1` on a dedicated, unpooled connection.

use super::connector::{CLOSE_BUDGET, Connector, ConnectorError, Phase, close_within, validate_connection_string};
use super::options::PingOptions;
use super::protocol::ProtocolKind;
use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Postgres
    }

    async fn ping(&self, connection_string: &str, options: &PingOptions) -> Result<Duration, ConnectorError> {
        validate_connection_string(connection_string, &["postgres", "postgresql"])?;
        let connect_options = PgConnectOptions::from_str(connection_string.trim())
            .map_err(|e| ConnectorError::invalid_input(e.to_string()))?
            .application_name("svcmon")
            // Server-side guard in case the client-side timeout loses the race
            .options([("statement_timeout", options.command_timeout.as_millis().to_string())]);

        let start = Instant::now();

        let mut conn = match timeout(options.timeout, PgConnection::connect_with(&connect_options)).await {
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

        let reply = timeout(
            options.command_timeout,
            sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&mut conn),
        )
        .await;
        let elapsed = start.elapsed();

        close_within(CLOSE_BUDGET.min(options.command_timeout), async move {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "Error closing PostgreSQL connection");
            }
        })
        .await;

        match reply {
            Ok(Ok(1)) => Ok(elapsed),
            Ok(Ok(other)) => Err(ConnectorError::InvalidResponse {
                message: format!("SELECT 1 returned {other}"),
                elapsed,
            }),
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
