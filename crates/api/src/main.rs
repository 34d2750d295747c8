//! ChatPush trigger host binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chatpush_common::config::AppConfig;
use chatpush_common::pools::{connect_redis, create_pg_pool};
use chatpush_engine::NotificationDispatcher;
use chatpush_engine::guard::RedisInvocationGuard;
use chatpush_engine::store::PgDocumentStore;
use chatpush_notifier::{FcmClient, ServiceAccountAuth, ServiceAccountKey};

use chatpush_api::routes::create_router;
use chatpush_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "chatpush_api=info,chatpush_engine=info,chatpush_notifier=info,tower_http=info",
            )
        }))
        .json()
        .init();

    tracing::info!("Starting ChatPush trigger host...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Document store
    let pool = create_pg_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");
    let store = Arc::new(PgDocumentStore::new(pool));

    // Push delivery
    let key = ServiceAccountKey::from_file(&config.google_application_credentials)?;
    let http = FcmClient::http_client(config.fcm_request_timeout_secs)?;
    let auth = Arc::new(ServiceAccountAuth::new(key, http.clone()));
    let project_id = config
        .fcm_project_id
        .clone()
        .or_else(|| auth.project_id().map(str::to_string))
        .ok_or_else(|| {
            anyhow::anyhow!("FCM_PROJECT_ID is unset and the service account has no project_id")
        })?;
    let push = Arc::new(FcmClient::new(http, auth, &config.fcm_endpoint, &project_id));
    tracing::info!(project_id = %project_id, "FCM client ready");

    let mut dispatcher = NotificationDispatcher::new(store, push);
    if let Some(redis) = connect_redis(config.redis_url.as_deref()).await? {
        dispatcher = dispatcher.with_guard(Arc::new(RedisInvocationGuard::new(
            redis,
            config.dedupe_ttl_seconds,
        )));
    }

    if config.trigger_jwt_secret.is_none() {
        tracing::warn!("TRIGGER_JWT_SECRET not set, trigger requests are not authenticated");
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|_| anyhow::anyhow!("LISTEN_ADDR must be a socket address"))?;

    // Build router
    let state = AppState::new(dispatcher, config);
    let app = create_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("Trigger host listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    tracing::info!("ChatPush trigger host stopped.");
    Ok(())
}
