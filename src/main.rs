use actix_web::{web, App, HttpServer, HttpResponse};
use actix_cors::Cors;
use authbox_server::{AppState, Settings, AppError};
use authbox_server::auth::handlers::{login, logout, me, refresh, register, verify};
use dotenv::dotenv;
use std::net::TcpListener;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let sessions = state.sessions.active_sessions().await;

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_sessions": sessions,
    }))
}

#[actix_web::main]
async fn main() -> authbox_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Initialize application state
    let state = web::Data::new(AppState::new(config.clone()));

    // Start background expiry sweep. Eventually-consistent cleanup only:
    // validation checks expiry on every lookup regardless.
    let sweep_state = state.clone();
    let sweep_interval = Duration::from_secs(config.auth.sweep_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_interval).await;

            let (sessions, tokens) = sweep_state.sessions.sweep_expired().await;
            if sessions + tokens > 0 {
                info!("Expiry sweep evicted {} session(s), {} token(s)", sessions, tokens);
            }

            sweep_state.limiter.cleanup().await;
        }
    });

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    let workers = config.server.workers as usize;

    info!(
        "Server initialized and ready to accept connections at http://{}:{}",
        config.server.host, config.server.port
    );

    // Start HTTP server
    HttpServer::new(move || {
        let cors = if config.cors.enabled {
            let cors_config = Cors::default();

            // Apply specific CORS rules based on configuration
            let cors_config = if config.cors.allow_any_origin {
                cors_config
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_any_header()
            } else {
                // More restrictive CORS for production use
                cors_config
                    .allowed_origin("http://localhost:8080")
                    .allowed_origin("http://127.0.0.1:8080")
                    .allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec!["Authorization", "Content-Type"])
                    .supports_credentials()
            };

            // Set max age
            cors_config.max_age(config.cors.max_age as usize)
        } else {
            // CORS disabled - use most restrictive settings
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/verify", web::post().to(verify))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route("/auth/me", web::get().to(me))
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
