use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::models::user::{ProfileUpdate, ResetTokenRecord, User};
use crate::repository::{StoreError, TokenStore, UserStore};
use crate::services::notification::Notifier;
use crate::services::storage::{StorageError, StorageService};
use crate::utils;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("missing bearer token")]
    AuthRequired,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("registration is disabled")]
    RegistrationDisabled,
    #[error("{0}")]
    Validation(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("internal auth error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Account id of `sub` when the token was issued.
    pub uid: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub username: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub username: String,
    pub token: String,
}

/// Hash a password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("failed to hash password: {e}")))
}

/// Hashes carried over from the bcrypt-based user file.
pub fn is_legacy_hash(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|p| hash.starts_with(p))
}

/// `Ok(false)` on mismatch, `Err` only when the stored hash is unreadable.
/// Accepts Argon2 PHC strings and legacy bcrypt hashes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    if is_legacy_hash(hash) {
        return bcrypt::verify(password, hash)
            .map_err(|e| AuthError::Internal(format!("invalid bcrypt hash: {e}")));
    }
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// Verified against for unknown usernames so both login failures cost the same.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("homevault-dummy-password").unwrap_or_default());

async fn hash_blocking(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
}

async fn verify_blocking(password: &str, hash: &str) -> Result<bool, AuthError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
}

fn check_password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn clean_optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
    reset_ttl: Duration,
    allow_registration: bool,
    public_url: String,
}

impl AuthService {
    pub fn new(
        config: &Config,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: Duration::seconds(config.token_ttl_secs as i64),
            reset_ttl: Duration::seconds(config.reset_token_ttl_secs as i64),
            allow_registration: config.allow_registration,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.username.clone(),
            uid: user.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let user = match utils::normalize_username(username) {
            Ok(name) => self.users.find_by_username(&name).await?,
            Err(_) => None,
        };

        let Some(user) = user else {
            let _ = verify_blocking(password, &DUMMY_HASH).await;
            tracing::info!(user = %username.to_lowercase(), "login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        match verify_blocking(password, &user.password_hash).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(user = %user.username, "login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::warn!(user = %user.username, error = %e, "stored password hash unusable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        let user = self.upgrade_legacy_hash(user, password).await;
        let token = self.issue_token(&user)?;
        tracing::info!(user = %user.username, "login succeeded");
        Ok(Session {
            username: user.username,
            token,
        })
    }

    /// Rewrites a bcrypt hash as Argon2 once the plain password is known.
    /// A failed rewrite leaves the old hash in place and the login stands.
    async fn upgrade_legacy_hash(&self, user: User, password: &str) -> User {
        if !is_legacy_hash(&user.password_hash) {
            return user;
        }
        let mut upgraded = user.clone();
        let result = match hash_blocking(password).await {
            Ok(hash) => {
                upgraded.password_hash = hash;
                self.users
                    .update(&user.username, upgraded.clone())
                    .await
                    .map_err(AuthError::from)
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                tracing::info!(user = %user.username, "upgraded legacy password hash");
                upgraded
            }
            Err(e) => {
                tracing::warn!(user = %user.username, error = %e, "failed to upgrade legacy password hash");
                user
            }
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<String>,
    ) -> Result<Session, AuthError> {
        if !self.allow_registration {
            return Err(AuthError::RegistrationDisabled);
        }
        let username = utils::normalize_username(username).map_err(AuthError::Validation)?;
        check_password_strength(password)?;

        let mut user = User::new(&username, hash_blocking(password).await?);
        user.email = email.and_then(clean_optional);
        let token = self.issue_token(&user)?;

        self.users.insert(user).await.map_err(|e| match e {
            StoreError::Conflict(what) => AuthError::Conflict(what),
            other => other.into(),
        })?;

        tracing::info!(user = %username, "account registered");
        Ok(Session { username, token })
    }

    /// Checks signature, expiry, revocation and that the subject is still the
    /// account the token was issued to. A name freed by a rename and taken by
    /// another account does not carry old tokens over.
    pub async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims = data.claims;

        if self.tokens.is_revoked(&claims.jti).await? {
            return Err(AuthError::InvalidToken);
        }
        match self.users.find_by_username(&claims.sub).await? {
            Some(user) if user.id.to_string() == claims.uid => {}
            _ => return Err(AuthError::InvalidToken),
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::InvalidToken)?;

        Ok(Identity {
            username: claims.sub,
            jti: claims.jti,
            expires_at,
        })
    }

    pub async fn logout(&self, identity: &Identity) -> Result<(), AuthError> {
        self.tokens
            .revoke_session(&identity.jti, identity.expires_at)
            .await?;
        tracing::info!(user = %identity.username, "logged out");
        Ok(())
    }

    /// Always succeeds from the caller's point of view, whether or not the
    /// address belongs to an account.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        let Some(user) = self.users.find_by_email(email).await? else {
            tracing::debug!("password reset requested for unknown address");
            return Ok(());
        };

        let raw = {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        };

        self.tokens
            .save_reset_token(
                utils::hash_token(&raw),
                ResetTokenRecord {
                    username: user.username.clone(),
                    expires_at: Utc::now() + self.reset_ttl,
                },
            )
            .await?;

        let link = format!("{}/reset-password?token={}", self.public_url, raw);
        if let Err(e) = self.notifier.send_password_reset(&user, &link).await {
            tracing::error!(user = %user.username, error = %e, "failed to deliver reset link");
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        check_password_strength(new_password)?;

        let invalid = || AuthError::Validation("reset token is invalid or expired".to_string());
        let record = self
            .tokens
            .take_reset_token(&utils::hash_token(token))
            .await?
            .ok_or_else(invalid)?;
        if record.expires_at <= Utc::now() {
            return Err(invalid());
        }

        let mut user = self
            .users
            .find_by_username(&record.username)
            .await?
            .ok_or_else(invalid)?;
        user.password_hash = hash_blocking(new_password).await?;
        user.updated_at = Utc::now();
        self.users.update(&record.username, user).await?;

        tracing::info!(user = %record.username, "password reset completed");
        Ok(())
    }

    pub async fn profile(&self, username: &str) -> Result<User, AuthError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user '{username}'")))
    }

    /// Applies `update` to the caller's account. Renaming the account also
    /// moves its home directory, revokes the caller's session and returns a
    /// token for the new name.
    pub async fn update_profile(
        &self,
        identity: &Identity,
        update: ProfileUpdate,
        storage: &StorageService,
    ) -> Result<(User, Option<String>), AuthError> {
        let current = self.profile(&identity.username).await?;
        let mut user = current.clone();

        if update.needs_current_password() {
            let supplied = update.current_password.as_deref().ok_or_else(|| {
                AuthError::Validation("current password is required".to_string())
            })?;
            if !verify_blocking(supplied, &current.password_hash).await? {
                return Err(AuthError::Validation(
                    "current password is incorrect".to_string(),
                ));
            }
        }

        if let Some(password) = update.new_password.as_deref() {
            check_password_strength(password)?;
            user.password_hash = hash_blocking(password).await?;
        }

        if let Some(email) = update.email {
            let email = clean_optional(email);
            if let Some(address) = email.as_deref() {
                if !address.contains('@') {
                    return Err(AuthError::Validation("email address is invalid".to_string()));
                }
                if let Some(owner) = self.users.find_by_email(address).await? {
                    if owner.username != current.username {
                        return Err(AuthError::Conflict("email address".to_string()));
                    }
                }
            }
            user.email = email;
        }

        if let Some(full_name) = update.full_name {
            user.full_name = clean_optional(full_name);
        }
        if let Some(is_public) = update.is_public {
            user.is_public = is_public;
        }

        let renamed = match update.username {
            Some(raw) => {
                let new_name = utils::normalize_username(&raw).map_err(AuthError::Validation)?;
                (new_name != current.username).then_some(new_name)
            }
            None => None,
        };

        user.updated_at = Utc::now();

        let Some(new_name) = renamed else {
            self.users.update(&current.username, user.clone()).await?;
            tracing::info!(user = %current.username, "profile updated");
            return Ok((user, None));
        };

        if self.users.find_by_username(&new_name).await?.is_some() {
            return Err(AuthError::Conflict(format!("user '{new_name}'")));
        }

        storage.rename_user_root(&current.username, &new_name).await?;
        user.username = new_name.clone();

        if let Err(e) = self.users.update(&current.username, user.clone()).await {
            if let Err(undo) = storage.rename_user_root(&new_name, &current.username).await {
                tracing::error!(
                    from = %new_name,
                    to = %current.username,
                    error = %undo,
                    "failed to restore home directory after aborted rename"
                );
            }
            return Err(e.into());
        }

        self.tokens
            .revoke_session(&identity.jti, identity.expires_at)
            .await?;
        tracing::info!(from = %current.username, to = %new_name, "account renamed");
        let token = self.issue_token(&user)?;
        Ok((user, Some(token)))
    }
}
