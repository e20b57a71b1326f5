use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use crate::auth::session::SessionManager;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Resolve a bearer credential to a subject id. Every failure mode
/// (unknown secret, expired session, malformed header) collapses into
/// `Unauthorized`; callers must not be able to tell them apart.
pub async fn authorize(sessions: &SessionManager, bearer: &str) -> Result<String, AppError> {
    sessions
        .validate_access(bearer)
        .await
        .map_err(|_| AuthError::Unauthorized.into())
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Request-scoped authenticated principal. Extracting this from a request
/// runs the bearer credential through the session manager; the resolved
/// subject id is valid only for the lifetime of that single request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let state = state
                .ok_or_else(|| AppError::InternalError("application state missing".to_string()))?;
            let token = token.ok_or(AuthError::Unauthorized)?;
            let user_id = authorize(&state.sessions, &token).await?;
            Ok(AuthenticatedUser { user_id })
        })
    }
}
