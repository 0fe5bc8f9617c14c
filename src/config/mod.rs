use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_QUOTA_BYTES: u64 = 250 * 1024 * 1024;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding one home directory per user.
    pub base_dir: PathBuf,
    /// JSON file with the account records.
    pub users_file: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub reset_token_ttl_secs: u64,
    pub quota_bytes: u64,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    pub allow_registration: bool,
    /// Copied into every home directory when it is first created.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    /// Built front end to serve at `/`, if any.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Base URL used when building password reset links.
    pub public_url: String,
}

impl Config {
    /// Defaults, then `homevault.toml` if present, then `HOMEVAULT_*`
    /// environment variables (e.g. `HOMEVAULT_BASE_DIR`, `HOMEVAULT_JWT_SECRET`).
    pub fn load() -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3001)?
            .set_default("base_dir", "users")?
            .set_default("users_file", "data/users.json")?
            .set_default("token_ttl_secs", 24 * 60 * 60)?
            .set_default("reset_token_ttl_secs", 60 * 60)?
            .set_default("quota_bytes", DEFAULT_QUOTA_BYTES as i64)?
            .set_default("max_upload_bytes", 300 * 1024 * 1024)?
            .set_default("request_timeout_secs", 120)?
            .set_default("allow_registration", false)?
            .set_default("public_url", "http://localhost:3001")?
            .add_source(::config::File::with_name("homevault").required(false))
            .add_source(
                ::config::Environment::with_prefix("HOMEVAULT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the storage location
    /// and signing secret.
    pub fn new(base_dir: impl Into<PathBuf>, users_file: impl Into<PathBuf>, jwt_secret: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            base_dir: base_dir.into(),
            users_file: users_file.into(),
            jwt_secret: jwt_secret.to_string(),
            token_ttl_secs: 24 * 60 * 60,
            reset_token_ttl_secs: 60 * 60,
            quota_bytes: DEFAULT_QUOTA_BYTES,
            max_upload_bytes: 300 * 1024 * 1024,
            request_timeout_secs: 120,
            allow_registration: false,
            template_dir: None,
            static_dir: None,
            public_url: "http://localhost:3001".to_string(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("jwt_secret must be at least {MIN_SECRET_LEN} bytes long");
        }
        if self.token_ttl_secs == 0 || self.reset_token_ttl_secs == 0 {
            anyhow::bail!("token lifetimes must be positive");
        }
        if self.quota_bytes == 0 {
            anyhow::bail!("quota_bytes must be positive");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
