use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted account record.
///
/// `password_hash` also reads the legacy `password` key that older user
/// files used for the stored hash. Records without an `id` get one on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable account id. Survives renames and is bound into every token.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub username: String,
    #[serde(alias = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "full_name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.to_lowercase(),
            password_hash,
            email: None,
            full_name: None,
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            is_public: self.is_public,
        }
    }
}

/// What `GET /api/user` returns. Field names follow the browser client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "isPublic")]
    pub is_public: bool,
}

/// Requested profile changes; every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "isPublic")]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "currentPassword")]
    pub current_password: Option<String>,
    #[serde(default, rename = "newPassword")]
    pub new_password: Option<String>,
}

impl ProfileUpdate {
    pub fn needs_current_password(&self) -> bool {
        self.new_password.is_some() || self.username.is_some()
    }
}

/// A pending password reset. The token itself is never stored, only its hash
/// is used as the key.
#[derive(Clone, Debug)]
pub struct ResetTokenRecord {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}
