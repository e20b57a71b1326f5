//! User directory collaborator for the AuthBox server
//!
//! Owns the `users` collection and the credential hashing policy. The
//! session core only sees this module through the [`CredentialVerifier`]
//! and [`SubjectDirectory`] capabilities.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::Utc;
use password_hash::{PasswordHash, SaltString};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::auth::token::{random_bytes, SerialGenerator};
use crate::auth::{CredentialVerifier, Subject, SubjectDirectory};
use crate::error::{AppError, StoreError};
use crate::store::{get_bool, get_str, object, Database, Document};

const USERS: &str = "users";

pub struct UserStore {
    db: Arc<Database>,
    serials: Arc<SerialGenerator>,
}

impl UserStore {
    pub fn new(db: Arc<Database>, serials: Arc<SerialGenerator>) -> Self {
        Self { db, serials }
    }

    /// Register a new, unverified user. The password is stored only as an
    /// Argon2 hash.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        let users = self.db.collection(USERS).await;
        if users
            .find_one(|d| get_str(d, "email") == Some(email))
            .await
            .is_some()
        {
            return Err(AppError::ValidationError("email already registered".into()));
        }

        let id = format!("u-{}", self.serials.next());
        let doc = object(json!({
            "id": id,
            "email": email,
            "password_hash": hash_password(password)?,
            "verified": false,
            "created": Utc::now().timestamp(),
        }));

        users.insert(doc).await?;
        Ok(id)
    }

    pub async fn find_by_email(&self, email: &str) -> Option<Document> {
        self.db
            .collection(USERS)
            .await
            .find_one(|d| get_str(d, "email") == Some(email))
            .await
    }

    /// Flip the verified flag in place, under the collection lock.
    pub async fn mark_verified(&self, user_id: &str) -> Result<(), AppError> {
        let updated = self
            .db
            .collection(USERS)
            .await
            .update(
                |d| get_str(d, "id") == Some(user_id),
                |d| {
                    d.insert("verified".to_string(), true.into());
                },
            )
            .await;
        if updated == 0 {
            return Err(StoreError::NotFound.into());
        }
        Ok(())
    }

    pub async fn user_count(&self) -> usize {
        self.db.collection(USERS).await.len().await
    }
}

#[async_trait]
impl CredentialVerifier for UserStore {
    async fn verify_credentials(&self, identity: &str, presented: &str) -> bool {
        match self.find_by_email(identity).await {
            Some(doc) => match get_str(&doc, "password_hash") {
                Some(hash) => verify_password(hash, presented),
                None => {
                    warn!("user record without password hash: {}", identity);
                    false
                }
            },
            None => false,
        }
    }
}

#[async_trait]
impl SubjectDirectory for UserStore {
    async fn lookup_subject(&self, identity: &str) -> Option<Subject> {
        let doc = self.find_by_email(identity).await?;
        Some(Subject {
            id: get_str(&doc, "id")?.to_string(),
            verified: get_bool(&doc, "verified").unwrap_or(false),
        })
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt_bytes = random_bytes(16)?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
