pub mod token_repo;
pub mod user_repo;

pub use token_repo::{InMemoryTokenStore, TokenStore};
pub use user_repo::{InMemoryUserStore, JsonUserStore, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("user store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("user store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
