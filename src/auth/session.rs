use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, AuthError, StoreError};
use crate::store::{get_i64, get_str, object, Database, Document};
use crate::auth::token::{random_token_url, SerialGenerator};

const SESSIONS: &str = "sessions";
const TOKENS: &str = "tokens";
const REVOKED_REFRESH: &str = "revoked_refresh";

/// A session as returned to clients. The access and refresh secrets are
/// only ever handed out here, at issuance; they cannot be read back out
/// of the store by any API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub access: String,
    pub access_exp: i64,
    pub refresh: String,
    pub refresh_exp: i64,
    pub family: String,
    pub created: i64,
}

impl Session {
    fn from_document(doc: &Document) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(doc.clone()))
            .map_err(|e| AppError::InternalError(format!("malformed session document: {}", e)))
    }
}

/// A subject as seen by the session manager: a stable identity plus the
/// verified gate. Everything else about users belongs to the directory
/// collaborator.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: String,
    pub verified: bool,
}

/// Opaque credential check supplied by a collaborator. The session
/// manager never sees stored credentials, only the boolean outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credentials(&self, identity: &str, presented: &str) -> bool;
}

/// Subject lookup supplied by a collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn lookup_subject(&self, identity: &str) -> Option<Subject>;
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub refresh_remember_ttl_secs: i64,
    pub verification_ttl_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 3600,
            refresh_remember_ttl_secs: 30 * 24 * 3600,
            verification_ttl_secs: 3600,
        }
    }
}

/// Orchestrates the credential lifecycle: one-time verification tokens,
/// session issuance, access validation, and refresh rotation. All state
/// lives in the injected [`Database`].
pub struct SessionManager {
    db: Arc<Database>,
    serials: Arc<SerialGenerator>,
    verifier: Arc<dyn CredentialVerifier>,
    directory: Arc<dyn SubjectDirectory>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        serials: Arc<SerialGenerator>,
        verifier: Arc<dyn CredentialVerifier>,
        directory: Arc<dyn SubjectDirectory>,
        config: SessionConfig,
    ) -> Self {
        Self {
            db,
            serials,
            verifier,
            directory,
            config,
        }
    }

    /// Create a one-time verification token for a subject. Returns the
    /// serial and the secret; in production the secret travels to the
    /// subject out-of-band.
    pub async fn create_verification(&self, user_id: &str) -> Result<(String, String), AppError> {
        let serial = format!("v-{}", self.serials.next());
        let secret = random_token_url(32)?;
        let doc = object(json!({
            "type": "verify",
            "serial": serial,
            "secret": secret,
            "user_id": user_id,
            "created": Utc::now().timestamp(),
            "ttl": self.config.verification_ttl_secs,
        }));

        self.db.collection(TOKENS).await.insert(doc).await?;
        Ok((serial, secret))
    }

    /// Consume a verification token. Exactly one caller can ever succeed
    /// for a given token; wrong serial, wrong secret, an already-consumed
    /// token, and an expired token all collapse into the same generic
    /// error so nothing can be learned by probing.
    pub async fn consume_verification(&self, serial: &str, secret: &str) -> Result<String, AppError> {
        let tokens = self.db.collection(TOKENS).await;
        let doc = tokens
            .consume_once(|d| {
                get_str(d, "type") == Some("verify")
                    && get_str(d, "serial") == Some(serial)
                    && get_str(d, "secret") == Some(secret)
            })
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let created = get_i64(&doc, "created").ok_or(AuthError::InvalidToken)?;
        let ttl = get_i64(&doc, "ttl").ok_or(AuthError::InvalidToken)?;
        if Utc::now().timestamp() > created + ttl {
            // Consumed and gone either way; the caller just learns it was invalid.
            return Err(AuthError::InvalidToken.into());
        }

        get_str(&doc, "user_id")
            .map(str::to_string)
            .ok_or_else(|| AuthError::InvalidToken.into())
    }

    /// Check credentials through the injected collaborators and issue a
    /// session for the resolved subject.
    pub async fn login(&self, identity: &str, presented: &str, remember: bool) -> Result<Session, AppError> {
        let subject = self
            .directory
            .lookup_subject(identity)
            .await
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verifier.verify_credentials(identity, presented).await {
            return Err(AuthError::InvalidCredentials.into());
        }
        if !subject.verified {
            return Err(AuthError::NotVerified.into());
        }

        self.issue_session(&subject.id, remember).await
    }

    /// Issue a fresh access/refresh pair with a new rotation family.
    pub async fn issue_session(&self, user_id: &str, remember: bool) -> Result<Session, AppError> {
        let access = random_token_url(24)?;
        let refresh = random_token_url(32)?;
        let family = random_token_url(12)?;
        let now = Utc::now().timestamp();
        let refresh_ttl = if remember {
            self.config.refresh_remember_ttl_secs
        } else {
            self.config.refresh_ttl_secs
        };

        let doc = self.session_document(user_id, &access, &refresh, &family, now, refresh_ttl, remember);
        self.db.collection(SESSIONS).await.insert(doc.clone()).await?;
        Session::from_document(&doc)
    }

    /// Resolve an access secret to a subject id. An expired session is
    /// deleted as a side effect of being looked up; this lazy check is
    /// the authoritative expiry enforcement, the background sweep only
    /// reclaims memory.
    pub async fn validate_access(&self, access: &str) -> Result<String, AppError> {
        let sessions = self.db.collection(SESSIONS).await;
        let doc = sessions
            .find_one(|d| get_str(d, "access") == Some(access))
            .await
            .ok_or(AuthError::InvalidToken)?;

        let exp = get_i64(&doc, "access_exp").ok_or(AuthError::InvalidToken)?;
        if Utc::now().timestamp() > exp {
            sessions.delete(|d| get_str(d, "access") == Some(access)).await;
            return Err(AuthError::TokenExpired.into());
        }

        get_str(&doc, "user_id")
            .map(str::to_string)
            .ok_or_else(|| AuthError::InvalidToken.into())
    }

    /// Rotate a session: the old refresh secret is permanently retired
    /// and a new access/refresh pair is issued under the same rotation
    /// family. Presenting an already-rotated refresh secret is treated
    /// as theft and revokes the whole family.
    pub async fn refresh_session(&self, old_refresh: &str) -> Result<Session, AppError> {
        let revoked = self.db.collection(REVOKED_REFRESH).await;
        if let Some(entry) = revoked
            .find_one(|d| get_str(d, "refresh") == Some(old_refresh))
            .await
        {
            if let Some(family) = get_str(&entry, "family") {
                let removed = self.revoke_family(family).await;
                warn!(
                    "rotated refresh secret presented again; revoked {} session(s) in its family",
                    removed
                );
            }
            return Err(AuthError::InvalidToken.into());
        }

        let sessions = self.db.collection(SESSIONS).await;
        let doc = sessions
            .find_one(|d| get_str(d, "refresh") == Some(old_refresh))
            .await
            .ok_or(AuthError::InvalidToken)?;

        let exp = get_i64(&doc, "refresh_exp").ok_or(AuthError::InvalidToken)?;
        if Utc::now().timestamp() > exp {
            sessions.delete(|d| get_str(d, "refresh") == Some(old_refresh)).await;
            return Err(AuthError::TokenExpired.into());
        }

        let user_id = get_str(&doc, "user_id").ok_or(AuthError::InvalidToken)?.to_string();
        let family = get_str(&doc, "family").ok_or(AuthError::InvalidToken)?.to_string();
        let remember = doc.get("remember").and_then(|v| v.as_bool()).unwrap_or(false);

        let access = random_token_url(24)?;
        let refresh = random_token_url(32)?;
        let now = Utc::now().timestamp();
        let refresh_ttl = if remember {
            self.config.refresh_remember_ttl_secs
        } else {
            self.config.refresh_ttl_secs
        };
        let new_doc =
            self.session_document(&user_id, &access, &refresh, &family, now, refresh_ttl, remember);

        // Single compare-and-swap keyed on the old refresh secret: the
        // predicate re-runs inside the collection's critical section, so
        // of two racing rotations exactly one wins and the loser sees the
        // same generic error as a bogus token.
        sessions
            .replace(|d| get_str(d, "refresh") == Some(old_refresh), new_doc.clone())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::from(AuthError::InvalidToken),
                other => other.into(),
            })?;

        let tombstone = object(json!({
            "refresh": old_refresh,
            "family": family,
            "rotated_at": now,
        }));
        revoked.insert(tombstone).await?;

        Session::from_document(&new_doc)
    }

    /// Explicit logout: drop the session holding this access secret.
    pub async fn invalidate_access(&self, access: &str) -> Result<(), AppError> {
        let removed = self
            .db
            .collection(SESSIONS)
            .await
            .delete(|d| get_str(d, "access") == Some(access))
            .await;
        if removed == 0 {
            return Err(AuthError::InvalidToken.into());
        }
        Ok(())
    }

    /// Drop every session descended from one login. Exposed so a caller
    /// that suspects token theft can cut the whole rotation chain.
    pub async fn revoke_family(&self, family: &str) -> usize {
        let removed = self
            .db
            .collection(SESSIONS)
            .await
            .delete(|d| get_str(d, "family") == Some(family))
            .await;
        self.db
            .collection(REVOKED_REFRESH)
            .await
            .delete(|d| get_str(d, "family") == Some(family))
            .await;
        removed
    }

    /// Evict sessions whose refresh window has closed, verification
    /// tokens past their TTL, and rotation tombstones too old to matter.
    /// Eventually-consistent cleanup only; validation still checks expiry
    /// on every lookup.
    pub async fn sweep_expired(&self) -> (usize, usize) {
        let now = Utc::now().timestamp();

        // Sessions with a live refresh secret are still rotatable even if
        // the access secret has lapsed, so only refresh expiry counts here.
        let sessions = self
            .db
            .collection(SESSIONS)
            .await
            .delete(|d| matches!(get_i64(d, "refresh_exp"), Some(exp) if now > exp))
            .await;

        let tokens = self
            .db
            .collection(TOKENS)
            .await
            .delete(|d| match (get_i64(d, "created"), get_i64(d, "ttl")) {
                (Some(created), Some(ttl)) => now > created + ttl,
                _ => false,
            })
            .await;

        let horizon = self.config.refresh_remember_ttl_secs;
        self.db
            .collection(REVOKED_REFRESH)
            .await
            .delete(|d| matches!(get_i64(d, "rotated_at"), Some(t) if now > t + horizon))
            .await;

        if sessions + tokens > 0 {
            debug!("sweep evicted {} session(s), {} token(s)", sessions, tokens);
        }
        (sessions, tokens)
    }

    pub async fn active_sessions(&self) -> usize {
        self.db.collection(SESSIONS).await.len().await
    }

    #[allow(clippy::too_many_arguments)]
    fn session_document(
        &self,
        user_id: &str,
        access: &str,
        refresh: &str,
        family: &str,
        now: i64,
        refresh_ttl: i64,
        remember: bool,
    ) -> Document {
        object(json!({
            "id": format!("s-{}", self.serials.next()),
            "user_id": user_id,
            "access": access,
            "access_exp": now + self.config.access_ttl_secs,
            "refresh": refresh,
            "refresh_exp": now + refresh_ttl,
            "family": family,
            "created": now,
            "remember": remember,
        }))
    }
}
