use async_trait::async_trait;

use crate::models::user::User;

/// Delivers account messages to users. The server ships with [`LogNotifier`];
/// a mail-backed implementation plugs in through this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, user: &User, reset_link: &str) -> anyhow::Result<()>;
}

/// Writes the reset link to the log instead of sending it anywhere.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, user: &User, reset_link: &str) -> anyhow::Result<()> {
        tracing::info!(
            user = %user.username,
            email = user.email.as_deref().unwrap_or(""),
            link = %reset_link,
            "password reset requested"
        );
        Ok(())
    }
}
