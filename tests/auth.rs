use std::sync::Arc;

use authbox_server::auth::{SerialGenerator, SessionConfig, SessionManager};
use authbox_server::error::{AppError, AuthError};
use authbox_server::store::Database;
use authbox_server::users::UserStore;
use chrono::Utc;
use futures::future::join_all;

fn manager(config: SessionConfig) -> (SessionManager, Arc<UserStore>) {
    let db = Arc::new(Database::new("testdb"));
    let serials = Arc::new(SerialGenerator::new());
    let users = Arc::new(UserStore::new(db.clone(), serials.clone()));
    let sessions = SessionManager::new(db, serials, users.clone(), users.clone(), config);
    (sessions, users)
}

#[tokio::test]
async fn test_verification_consumed_exactly_once() {
    let (sessions, users) = manager(SessionConfig::default());
    let user_id = users.create_user("u1@example.com", "password123").await.unwrap();

    let (serial, secret) = sessions.create_verification(&user_id).await.unwrap();

    let resolved = sessions.consume_verification(&serial, &secret).await.unwrap();
    assert_eq!(resolved, user_id);

    // Second consumption of the same pair fails with the generic error
    let err = sessions.consume_verification(&serial, &secret).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_verification_mismatch_is_generic() {
    let (sessions, users) = manager(SessionConfig::default());
    let user_id = users.create_user("u1@example.com", "password123").await.unwrap();
    let (serial, secret) = sessions.create_verification(&user_id).await.unwrap();

    // Wrong secret and wrong serial produce the same error as a used token
    let err = sessions.consume_verification(&serial, "bogus").await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
    let err = sessions.consume_verification("v-999", &secret).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));

    // The token survived both bad attempts
    let resolved = sessions.consume_verification(&serial, &secret).await.unwrap();
    assert_eq!(resolved, user_id);
}

#[tokio::test]
async fn test_expired_verification_rejected() {
    let config = SessionConfig {
        verification_ttl_secs: -1,
        ..SessionConfig::default()
    };
    let (sessions, users) = manager(config);
    let user_id = users.create_user("u1@example.com", "password123").await.unwrap();

    let (serial, secret) = sessions.create_verification(&user_id).await.unwrap();
    let err = sessions.consume_verification(&serial, &secret).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_issue_and_validate_access() {
    let (sessions, _) = manager(SessionConfig::default());

    let before = Utc::now().timestamp();
    let session = sessions.issue_session("u-1", false).await.unwrap();
    let after = Utc::now().timestamp();

    assert_eq!(session.user_id, "u-1");
    assert!(session.access_exp >= before + 900 && session.access_exp <= after + 900);
    assert!(session.access_exp < session.refresh_exp);

    let resolved = sessions.validate_access(&session.access).await.unwrap();
    assert_eq!(resolved, "u-1");

    // Repeated validation keeps working while unexpired
    let resolved = sessions.validate_access(&session.access).await.unwrap();
    assert_eq!(resolved, "u-1");
}

#[tokio::test]
async fn test_expired_access_is_lazily_deleted() {
    let config = SessionConfig {
        access_ttl_secs: -1,
        ..SessionConfig::default()
    };
    let (sessions, _) = manager(config);
    let session = sessions.issue_session("u-1", false).await.unwrap();

    let err = sessions.validate_access(&session.access).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::TokenExpired)));

    // The expiry check deleted the session: the secret no longer resolves
    // at all, even to an expiry report
    let err = sessions.validate_access(&session.access).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
    assert_eq!(sessions.active_sessions().await, 0);
}

#[tokio::test]
async fn test_refresh_rotates_secrets_and_keeps_family() {
    let (sessions, _) = manager(SessionConfig::default());
    let first = sessions.issue_session("u-1", false).await.unwrap();

    let second = sessions.refresh_session(&first.refresh).await.unwrap();
    assert_eq!(second.user_id, "u-1");
    assert_eq!(second.family, first.family);
    assert_ne!(second.access, first.access);
    assert_ne!(second.refresh, first.refresh);

    // The old pair is dead, the new pair works
    assert!(sessions.validate_access(&first.access).await.is_err());
    assert_eq!(sessions.validate_access(&second.access).await.unwrap(), "u-1");
    assert_eq!(sessions.active_sessions().await, 1);
}

#[tokio::test]
async fn test_expired_refresh_rejected_and_deleted() {
    let config = SessionConfig {
        refresh_ttl_secs: -1,
        ..SessionConfig::default()
    };
    let (sessions, _) = manager(config);
    let session = sessions.issue_session("u-1", false).await.unwrap();

    let err = sessions.refresh_session(&session.refresh).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::TokenExpired)));
    assert_eq!(sessions.active_sessions().await, 0);
}

#[tokio::test]
async fn test_refresh_reuse_revokes_family() {
    let (sessions, _) = manager(SessionConfig::default());
    let first = sessions.issue_session("u-1", false).await.unwrap();
    let second = sessions.refresh_session(&first.refresh).await.unwrap();

    // Presenting the already-rotated secret signals theft
    let err = sessions.refresh_session(&first.refresh).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));

    // The whole rotation chain is gone
    assert!(sessions.validate_access(&second.access).await.is_err());
    assert!(sessions.refresh_session(&second.refresh).await.is_err());
    assert_eq!(sessions.active_sessions().await, 0);
}

#[tokio::test]
async fn test_concurrent_refresh_single_winner() {
    let (sessions, _) = manager(SessionConfig::default());
    let sessions = Arc::new(sessions);
    let first = sessions.issue_session("u-1", false).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let sessions = sessions.clone();
            let refresh = first.refresh.clone();
            tokio::spawn(async move { sessions.refresh_session(&refresh).await })
        })
        .collect();

    let outcomes = join_all(tasks).await;
    let wins = outcomes
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(wins, 1, "exactly one rotation may win");

    // Losers that raced the swap itself saw a plain miss; losers that
    // arrived after the winner committed counted as reuse and revoked
    // the family. Either way the store never holds a duplicated session
    // and the old secret stays dead.
    assert!(sessions.active_sessions().await <= 1);
    assert!(sessions.refresh_session(&first.refresh).await.is_err());
}

#[tokio::test]
async fn test_revoke_family_cuts_whole_chain() {
    let (sessions, _) = manager(SessionConfig::default());
    let first = sessions.issue_session("u-1", false).await.unwrap();
    let second = sessions.refresh_session(&first.refresh).await.unwrap();
    let other = sessions.issue_session("u-2", false).await.unwrap();

    let removed = sessions.revoke_family(&second.family).await;
    assert_eq!(removed, 1);
    assert!(sessions.validate_access(&second.access).await.is_err());

    // Unrelated families are untouched
    assert_eq!(sessions.validate_access(&other.access).await.unwrap(), "u-2");
}

#[tokio::test]
async fn test_logout_invalidates_access() {
    let (sessions, _) = manager(SessionConfig::default());
    let session = sessions.issue_session("u-1", false).await.unwrap();

    sessions.invalidate_access(&session.access).await.unwrap();
    assert!(sessions.validate_access(&session.access).await.is_err());

    let err = sessions.invalidate_access(&session.access).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_sweep_evicts_expired_documents() {
    let config = SessionConfig {
        refresh_ttl_secs: -1,
        verification_ttl_secs: -1,
        ..SessionConfig::default()
    };
    let (sessions, users) = manager(config);
    let user_id = users.create_user("u1@example.com", "password123").await.unwrap();

    sessions.issue_session(&user_id, false).await.unwrap();
    sessions.issue_session(&user_id, false).await.unwrap();
    sessions.create_verification(&user_id).await.unwrap();

    let (swept_sessions, swept_tokens) = sessions.sweep_expired().await;
    assert_eq!(swept_sessions, 2);
    assert_eq!(swept_tokens, 1);
    assert_eq!(sessions.active_sessions().await, 0);
}

#[tokio::test]
async fn test_sweep_keeps_live_sessions() {
    let (sessions, _) = manager(SessionConfig::default());
    sessions.issue_session("u-1", false).await.unwrap();

    let (swept_sessions, swept_tokens) = sessions.sweep_expired().await;
    assert_eq!((swept_sessions, swept_tokens), (0, 0));
    assert_eq!(sessions.active_sessions().await, 1);
}

#[tokio::test]
async fn test_full_account_flow() {
    let (sessions, users) = manager(SessionConfig::default());
    let user_id = users.create_user("u1@example.com", "password123").await.unwrap();

    // Login before verification is gated
    let err = sessions.login("u1@example.com", "password123", false).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(AuthError::NotVerified)));

    // Verify, then login succeeds
    let (serial, secret) = sessions.create_verification(&user_id).await.unwrap();
    let resolved = sessions.consume_verification(&serial, &secret).await.unwrap();
    users.mark_verified(&resolved).await.unwrap();

    let session = sessions.login("u1@example.com", "password123", false).await.unwrap();
    assert_eq!(sessions.validate_access(&session.access).await.unwrap(), user_id);

    // Logout, and the access secret is dead
    sessions.invalidate_access(&session.access).await.unwrap();
    assert!(sessions.validate_access(&session.access).await.is_err());
}
