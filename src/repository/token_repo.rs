use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::StoreError;
use crate::models::user::ResetTokenRecord;

/// Short-lived auth state: pending password resets and revoked sessions.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_reset_token(&self, token_hash: String, record: ResetTokenRecord) -> Result<(), StoreError>;

    /// Removes and returns the record, so a token can be used only once.
    async fn take_reset_token(&self, token_hash: &str) -> Result<Option<ResetTokenRecord>, StoreError>;

    async fn revoke_session(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError>;
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    resets: DashMap<String, ResetTokenRecord>,
    revoked: DashMap<String, DateTime<Utc>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self) {
        let now = Utc::now();
        self.resets.retain(|_, record| record.expires_at > now);
        self.revoked.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn save_reset_token(&self, token_hash: String, record: ResetTokenRecord) -> Result<(), StoreError> {
        self.purge_expired();
        // One outstanding reset per user.
        self.resets.retain(|_, existing| existing.username != record.username);
        self.resets.insert(token_hash, record);
        Ok(())
    }

    async fn take_reset_token(&self, token_hash: &str) -> Result<Option<ResetTokenRecord>, StoreError> {
        Ok(self.resets.remove(token_hash).map(|(_, record)| record))
    }

    async fn revoke_session(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.purge_expired();
        self.revoked.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.revoked.contains_key(jti))
    }
}
