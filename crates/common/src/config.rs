use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string for the document store
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Redis connection string. When unset, duplicate trigger deliveries are not filtered.
    pub redis_url: Option<String>,

    /// How long a `(chat, message)` claim is remembered, in seconds (default: 3600)
    pub dedupe_ttl_seconds: u64,

    /// Firebase project id. Falls back to the service account's `project_id`.
    pub fcm_project_id: Option<String>,

    /// Path to the Google service account JSON used to mint FCM access tokens
    pub google_application_credentials: String,

    /// FCM base URL (default: https://fcm.googleapis.com)
    pub fcm_endpoint: String,

    /// Per-request timeout for FCM sends in seconds (default: 10)
    pub fcm_request_timeout_secs: u64,

    /// HS256 secret the event source signs trigger requests with. Auth is off when unset.
    pub trigger_jwt_secret: Option<String>,

    /// HTTP listen address for the trigger host (default: 0.0.0.0:8080)
    pub listen_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            redis_url: std::env::var("REDIS_URL").ok(),
            dedupe_ttl_seconds: std::env::var("DEDUPE_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEDUPE_TTL_SECONDS must be a valid u64"))?,
            fcm_project_id: std::env::var("FCM_PROJECT_ID").ok(),
            google_application_credentials: std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
                .map_err(|_| {
                    anyhow::anyhow!("GOOGLE_APPLICATION_CREDENTIALS environment variable is required")
                })?,
            fcm_endpoint: std::env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
            fcm_request_timeout_secs: std::env::var("FCM_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_REQUEST_TIMEOUT_SECS must be a valid u64"))?,
            trigger_jwt_secret: std::env::var("TRIGGER_JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}
