use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use hookrelay::{
    gateway::GatewayConfig,
    handlers::{admin, gateway::inbound_handler},
    queue::{QueueConfig, SqliteQueue},
    state::AppState,
    worker::{JobContext, default_registry, spawn_reaper, spawn_workers},
};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:hookrelay.db".to_string());
    let bind_addr =
        std::env::var("HOOKRELAY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&pool)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = GatewayConfig::from_env();
    let queue_config = QueueConfig::from_env();

    let queue = Arc::new(SqliteQueue::new(
        pool.clone(),
        queue_config.clone(),
        "dispatcher",
    ));
    let ctx = JobContext {
        pool: pool.clone(),
        http: reqwest::Client::new(),
        queue,
        hooks: Arc::new(hookrelay::dispatcher::TransformRegistry::new()),
        config: queue_config.clone(),
    };
    let registry = Arc::new(default_registry());

    spawn_workers(&ctx, registry, queue_config.worker_count);
    spawn_reaper(pool.clone(), queue_config.clone());

    let state = AppState {
        pool,
        gateway,
        queue: queue_config,
    };

    let app = Router::new()
        .route("/webhook/inbound", post(inbound_handler))
        .route("/internal/queue/stats", get(admin::queue_stats_handler))
        .route("/internal/jobs/:id", get(admin::get_job_handler))
        .route(
            "/internal/jobs/:id/attempts",
            get(admin::list_job_attempts_handler),
        )
        .route("/internal/jobs/:id/cancel", post(admin::cancel_job_handler))
        .route("/internal/dlq", get(admin::list_dlq_handler))
        .route("/internal/dlq/:id/requeue", post(admin::requeue_dlq_handler))
        .route("/internal/dlq/:id/resolve", post(admin::resolve_dlq_handler))
        .route(
            "/internal/subscribers",
            post(admin::create_subscriber_handler).get(admin::list_subscribers_handler),
        )
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
