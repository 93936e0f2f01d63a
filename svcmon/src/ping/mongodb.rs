//! MongoDB liveness: `{ ping: 1 }` against the `admin` database.
//!
//! The driver connects lazily, so the connect budget is spent inside server selection for the
//! command. `mongodb+srv` strings also resolve DNS while parsing, which therefore counts as part
//! of the connect phase.

use super::connector::{CLOSE_BUDGET, Connector, ConnectorError, Phase, close_within, validate_connection_string};
use super::options::PingOptions;
use super::protocol::ProtocolKind;
use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::MongoDb
    }

    async fn ping(&self, connection_string: &str, options: &PingOptions) -> Result<Duration, ConnectorError> {
        validate_connection_string(connection_string, &["mongodb", "mongodb+srv"])?;

        let start = Instant::now();

        let mut client_options = match timeout(options.timeout, ClientOptions::parse(connection_string.trim())).await {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(e)) if matches!(*e.kind, ErrorKind::InvalidArgument { .. }) => {
                return Err(ConnectorError::invalid_input(e.to_string()));
            }
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

        client_options.app_name = Some("svcmon".to_string());
        client_options.connect_timeout = Some(options.timeout);
        client_options.server_selection_timeout = Some(options.timeout);
        client_options.max_pool_size = Some(1);
        client_options.min_pool_size = Some(0);
        client_options.retry_reads = Some(false);

        let client = Client::with_options(client_options).map_err(|e| ConnectorError::invalid_input(e.to_string()))?;

        // Server selection (connect) and the command share one budget.
        let budget = options.hard_deadline().saturating_sub(start.elapsed());
        let reply = timeout(budget, client.database("admin").run_command(doc! { "ping": 1 })).await;
        let elapsed = start.elapsed();

        close_within(CLOSE_BUDGET.min(options.command_timeout), client.shutdown()).await;

        match reply {
            Ok(Ok(document)) if ping_ok(&document) => Ok(elapsed),
            Ok(Ok(document)) => Err(ConnectorError::InvalidResponse {
                message: format!("ping returned {document}"),
                elapsed,
            }),
            Ok(Err(e)) => match *e.kind {
                ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } | ErrorKind::Io(_) => {
                    Err(ConnectorError::Connect {
                        message: e.to_string(),
                        elapsed,
                    })
                }
                _ => Err(ConnectorError::Command {
                    message: e.to_string(),
                    elapsed,
                }),
            },
            Err(_) => Err(ConnectorError::Timeout {
                phase: Phase::Command,
                elapsed,
            }),
        }
    }
}

/// `ok` comes back as a double from most servers but as an int from some proxies.
fn ping_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(ok)) => *ok == 1.0,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        _ => false,
    }
}
