use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::StoreError;
use crate::models::user::User;

/// Account records, keyed by lowercase username.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn insert(&self, user: User) -> Result<(), StoreError>;

    /// Replaces the record stored under `username`. `user.username` may
    /// differ, in which case the record is re-keyed.
    async fn update(&self, username: &str, user: User) -> Result<(), StoreError>;
}

type UserTable = HashMap<String, User>;

fn insert_into(table: &mut UserTable, user: User) -> Result<(), StoreError> {
    if table.contains_key(&user.username) {
        return Err(StoreError::Conflict(format!("user '{}'", user.username)));
    }
    table.insert(user.username.clone(), user);
    Ok(())
}

fn update_in(table: &mut UserTable, username: &str, user: User) -> Result<(), StoreError> {
    if !table.contains_key(username) {
        return Err(StoreError::NotFound(format!("user '{username}'")));
    }
    if user.username != username && table.contains_key(&user.username) {
        return Err(StoreError::Conflict(format!("user '{}'", user.username)));
    }
    table.remove(username);
    table.insert(user.username.clone(), user);
    Ok(())
}

fn find_email(table: &UserTable, email: &str) -> Option<User> {
    table
        .values()
        .find(|u| {
            u.email
                .as_deref()
                .map_or(false, |e| e.eq_ignore_ascii_case(email))
        })
        .cloned()
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<UserTable>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let table = users
            .into_iter()
            .map(|u| (u.username.to_lowercase(), u))
            .collect();
        Self {
            users: RwLock::new(table),
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(&username.to_lowercase()).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(find_email(&self.users.read(), email))
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        insert_into(&mut self.users.write(), user)
    }

    async fn update(&self, username: &str, user: User) -> Result<(), StoreError> {
        update_in(&mut self.users.write(), username, user)
    }
}

/// Users kept in a JSON array on disk, loaded once at startup and rewritten
/// atomically after every change.
pub struct JsonUserStore {
    path: PathBuf,
    users: RwLock<UserTable>,
    write_lock: Mutex<()>,
}

impl JsonUserStore {
    /// Loads `path`; a missing file is an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let (table, assigned_ids) = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let records: Vec<serde_json::Value> = serde_json::from_slice(&raw)?;
                let missing = records.iter().filter(|r| r.get("id").is_none()).count();
                let mut table = UserTable::with_capacity(records.len());
                for record in records {
                    let mut user: User = serde_json::from_value(record)?;
                    user.username = user.username.to_lowercase();
                    table.insert(user.username.clone(), user);
                }
                (table, missing)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (UserTable::new(), 0),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), users = table.len(), "user store loaded");

        let store = Self {
            path,
            users: RwLock::new(table),
            write_lock: Mutex::new(()),
        };
        // Fresh ids must be written back, or tokens would not survive a restart.
        if assigned_ids > 0 {
            tracing::info!(records = assigned_ids, "assigned account ids to legacy records");
            store.commit(|_| Ok(())).await?;
        }
        Ok(store)
    }

    async fn commit<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UserTable) -> Result<(), StoreError> + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut next = self.users.read().clone();
        change(&mut next)?;

        let mut records: Vec<User> = next.values().cloned().collect();
        records.sort_by(|a, b| a.username.cmp(&b.username));
        let raw = serde_json::to_vec_pretty(&records)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist_atomically(&path, &raw)).await??;

        *self.users.write() = next;
        Ok(())
    }
}

fn persist_atomically(path: &Path, raw: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(raw)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(&username.to_lowercase()).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(find_email(&self.users.read(), email))
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        self.commit(|table| insert_into(table, user)).await
    }

    async fn update(&self, username: &str, user: User) -> Result<(), StoreError> {
        let username = username.to_string();
        self.commit(move |table| update_in(table, &username, user)).await
    }
}
