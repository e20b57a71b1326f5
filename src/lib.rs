pub mod auth;
pub mod config;
pub mod error;
pub mod store;
pub mod users;

use std::sync::Arc;
use actix_web::HttpResponse;
use chrono::Duration;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthenticatedUser, LoginRateLimiter, RateLimitConfig, Session, SessionManager};
pub use store::{Collection, Database, Document};
pub use users::UserStore;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: Arc<Database>,
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionManager>,
    pub limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Wire the store into the user directory and session manager. The
    /// database is constructed here and injected by handle; nothing in
    /// the crate reaches for a global instance.
    pub fn new(config: Settings) -> Self {
        let db = Arc::new(Database::new("authbox"));
        let serials = Arc::new(auth::SerialGenerator::new());
        let users = Arc::new(UserStore::new(db.clone(), serials.clone()));

        let session_config = auth::SessionConfig {
            access_ttl_secs: config.auth.access_ttl_secs,
            refresh_ttl_secs: config.auth.refresh_ttl_secs,
            refresh_remember_ttl_secs: config.auth.refresh_remember_ttl_secs,
            verification_ttl_secs: config.auth.verification_ttl_secs,
        };
        let sessions = Arc::new(SessionManager::new(
            db.clone(),
            serials,
            users.clone(),
            users.clone(),
            session_config,
        ));

        let limiter = Arc::new(LoginRateLimiter::new(RateLimitConfig {
            window_size: Duration::seconds(config.auth.login_window_secs),
            max_attempts: config.auth.login_max_attempts,
        }));

        Self {
            config: Arc::new(config),
            db,
            users,
            sessions,
            limiter,
        }
    }
}
