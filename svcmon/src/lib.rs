//! # svcmon: health checks for user-registered datastores
//!
//! `svcmon` keeps track of whether the MongoDB, PostgreSQL and Redis endpoints that users have
//! registered are reachable. Each service carries its own check interval; whenever a service
//! comes due it is pinged with a fresh connection, the outcome is appended to its history, and
//! its status, failure streak and uptime are recomputed. Services that keep failing can be
//! disabled automatically, which is recorded in the audit log.
//!
//! ## Architecture
//!
//! - [`ping`]: one liveness attempt per protocol, behind the [`ping::Connector`] trait, and the
//!   [`ping::PingExecutor`] that adds option layering, retries and a hard deadline
//! - [`monitor`]: the status updater, the bounded-concurrency batch processor, the user-facing
//!   [`monitor::PingService`] and the background [`monitor::PingScheduler`]
//! - [`db`]: the [`db::store::ServiceStore`] trait with PostgreSQL and in-memory implementations
//! - [`api`] and [`auth`]: the HTTP surface
//!
//! Batches are started either by the scheduler, on the replica that holds the leader lock, or by
//! an external cron calling `POST /api/v1/ping/trigger` with the shared API key.
//!
//! ## Running
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/svcmon PING_API_KEY=change-me svcmon -f config.yaml
//! ```
//!
//! Without a database URL the service runs on an in-process store, which is handy for trying
//! it out but keeps nothing across restarts.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod leader_election;
pub mod monitor;
pub mod ping;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use crate::config::PoolSettings;
use crate::db::{memory::InMemoryStore, postgres::PostgresStore, store::ServiceStore};
use crate::monitor::{PingScheduler, PingService};
use crate::ping::{Connectors, PingExecutor};
use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};

pub use types::{ServiceId, UserId};

/// Shared state handed to every request handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .ping_service(ping_service)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub ping_service: PingService,
    /// Whether this replica currently runs the scheduler
    #[builder(default = Arc::new(AtomicBool::new(false)))]
    pub is_leader: Arc<AtomicBool>,
}

/// Get the svcmon database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
}

/// Connect and migrate, or `None` when no database is configured.
async fn setup_database(config: &Config) -> anyhow::Result<Option<PgPool>> {
    let Some(url) = config.database.url.as_deref() else {
        info!("No database configured, using the in-memory store (nothing will persist)");
        return Ok(None);
    };

    info!("Using external database");
    let pool = pool_options(&config.database.pool).connect(url).await?;
    migrator().run(&pool).await?;

    Ok(Some(pool))
}

/// Build the application router.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    use api::handlers::{health, services, trigger};

    let api_routes = Router::new()
        .route("/ping/trigger", post(trigger::trigger_ping_batch))
        .route("/services/ping", post(services::ping_my_services))
        .route("/services/{id}/ping", post(services::ping_service))
        .route("/services/{id}/pings", get(services::list_service_pings));

    Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api/v1", api_routes)
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Background tasks running beside the HTTP server: the ping scheduler and, with a database,
/// leader election gating it.
///
/// Dropping this cancels every task through `drop_guard`; [`BackgroundServices::shutdown`]
/// additionally waits for them to finish.
pub struct BackgroundServices {
    is_leader: Arc<AtomicBool>,
    background_tasks: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// The scheduler run started when this replica gained leadership.
type LeadershipSession = Arc<Mutex<Option<(CancellationToken, JoinHandle<()>)>>>;

fn setup_background_services(
    scheduler: PingScheduler,
    pool: Option<PgPool>,
    config: &Config,
    shutdown_token: CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let is_leader = Arc::new(AtomicBool::new(false));
    let mut background_tasks = Vec::new();

    if !config.scheduler.enabled {
        info!("Background scheduler disabled, pings only run when triggered");
    } else if let Some(pool) = pool.filter(|_| config.leader_election.enabled) {
        info!("Starting leader election - will attempt to acquire leadership");

        let session: LeadershipSession = Arc::new(Mutex::new(None));
        let session_gain = session.clone();
        let session_lose = session;
        let shutdown_gain = shutdown_token.clone();

        let handle = tokio::spawn(leader_election::leader_election_task(
            pool,
            is_leader.clone(),
            config.leader_election.lock_id,
            shutdown_token.clone(),
            move || {
                let scheduler = scheduler.clone();
                let session = session_gain.clone();
                let session_token = shutdown_gain.child_token();
                async move {
                    let daemon = tokio::spawn(scheduler.run_daemon(session_token.clone()));
                    *session.lock().await = Some((session_token, daemon));
                    info!("Ping scheduler started on elected leader");
                    Ok(())
                }
            },
            move || {
                let session = session_lose.clone();
                async move {
                    if let Some((token, daemon)) = session.lock().await.take() {
                        token.cancel();
                        daemon
                            .await
                            .map_err(|e| anyhow::anyhow!("Ping scheduler did not stop cleanly: {}", e))?;
                        info!("Ping scheduler stopped (lost leadership)");
                    }
                    Ok(())
                }
            },
        ));
        background_tasks.push(handle);
    } else {
        if config.leader_election.enabled {
            info!("Leader election needs a database, running as leader");
        } else {
            info!("Launching without leader election: running as leader");
        }
        is_leader.store(true, Ordering::Relaxed);
        background_tasks.push(tokio::spawn(scheduler.run_daemon(shutdown_token.clone())));
    }

    BackgroundServices {
        is_leader,
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Owns the router, the database pool and the background services.
///
/// 1. [`Application::new`] connects (or falls back to the in-memory store), runs migrations and
///    starts the background services
/// 2. [`Application::serve`] handles requests until the shutdown future resolves, then stops
///    the background services and closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
    bg_services: BackgroundServices,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting svcmon with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let store: Arc<dyn ServiceStore> = match &pool {
            Some(pool) => Arc::new(PostgresStore::new(pool.clone())),
            None => Arc::new(InMemoryStore::new()),
        };

        Self::new_with_store(config, store, pool, Connectors::new()).await
    }

    /// Build around an existing store and set of connectors. `pool` is only used for leader
    /// election and shutdown.
    pub async fn new_with_store(
        config: Config,
        store: Arc<dyn ServiceStore>,
        pool: Option<PgPool>,
        connectors: Connectors,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let executor = PingExecutor::new(connectors, config.ping);
        let ping_service = PingService::new(store, executor, config.scheduler.concurrency, config.trigger.max_batch_size);
        let scheduler = PingScheduler::new(ping_service.clone(), config.scheduler.clone());

        let bg_services = setup_background_services(scheduler, pool.clone(), &config, CancellationToken::new());

        let app_state = AppState::builder()
            .config(config.clone())
            .ping_service(ping_service)
            .is_leader(bg_services.is_leader.clone())
            .build();
        let router = build_router(&app_state);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("svcmon listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
