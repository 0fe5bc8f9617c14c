pub mod auth;
pub mod notification;
pub mod storage;

use crate::config::Config;
use crate::repository::{InMemoryTokenStore, JsonUserStore, TokenStore, UserStore};
use std::sync::Arc;

use self::auth::AuthService;
use self::notification::{LogNotifier, Notifier};
use self::storage::StorageService;

pub struct AppState {
    pub config: Config,
    pub auth: Arc<AuthService>,
    pub storage: Arc<StorageService>,
}

impl AppState {
    /// Production wiring: JSON user file, in-memory tokens, log notifier.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let users: Arc<dyn UserStore> = Arc::new(JsonUserStore::load(&config.users_file).await?);
        let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        Self::with_stores(config, users, tokens, Arc::new(LogNotifier)).await
    }

    pub async fn with_stores(
        config: Config,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let storage = Arc::new(
            StorageService::new(&config.base_dir, config.quota_bytes)
                .await?
                .with_template_dir(config.template_dir.clone()),
        );
        let auth = Arc::new(AuthService::new(&config, users, tokens, notifier));

        Ok(Self {
            config,
            auth,
            storage,
        })
    }
}
