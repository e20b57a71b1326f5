use actix_web::{web, HttpResponse, HttpRequest};
use serde::{Deserialize, Serialize};
use crate::AppState;
use crate::error::{AppError, AuthError};
use crate::auth::guard::AuthenticatedUser;
use tracing::{info, error, warn};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub serial: String,
    // Development shortcut: in production the verification secret travels
    // out-of-band (mail), never in the registration response.
    pub verification_token: String,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);

    if req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::ValidationError("email and password are required".into()));
    }

    let user_id = match state.users.create_user(&req.email, &req.password).await {
        Ok(id) => id,
        Err(e) => {
            error!("Registration failed for email: {}: {}", req.email, e);
            return Err(e);
        }
    };

    let (serial, verification_token) = state.sessions.create_verification(&user_id).await?;
    info!("Registration successful for email: {} (user {})", req.email, user_id);

    Ok(HttpResponse::Created().json(RegisterResponse {
        user_id,
        serial,
        verification_token,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub serial: String,
    pub token: String,
}

pub async fn verify(
    req: web::Json<VerifyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = match state.sessions.consume_verification(&req.serial, &req.token).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Verification failed for serial: {}", req.serial);
            return Err(e);
        }
    };

    state.users.mark_verified(&user_id).await?;
    info!("Verification successful for user: {}", user_id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "user_id": user_id,
        "verified": true
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);

    if !state.limiter.check_attempt(&req.email).await {
        warn!("Login rate limit hit for email: {}", req.email);
        return Err(AuthError::RateLimited.into());
    }

    match state.sessions.login(&req.email, &req.password, req.remember).await {
        Ok(session) => {
            info!("Login successful for email: {}", req.email);
            Ok(HttpResponse::Ok().json(session))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.sessions.refresh_session(&req.refresh).await {
        Ok(session) => {
            info!("Session rotated for user: {}", session.user_id);
            Ok(HttpResponse::Ok().json(session))
        }
        Err(e) => {
            warn!("Refresh failed: {}", e);
            Err(e)
        }
    }
}

pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    // Get token from Authorization header
    let token = req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AuthError::Unauthorized)?;

    // Invalidate the session
    state.sessions.invalidate_access(token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

pub async fn me(user: AuthenticatedUser) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "user_id": user.user_id
    })))
}
