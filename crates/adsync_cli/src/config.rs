//! Configuration file support for adsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `ADSYNC_`, sections separated by
//!    a double underscore, e.g. `ADSYNC_GRAPH__APP_SECRET`)
//! 3. Config file (~/.config/adsync/config.toml or ./adsync.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/adsync/adsync.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "postgres://localhost/adsync"  # optional, SQLite in the state dir by default
//!
//! [graph]
//! base_url = "https://graph.facebook.com"
//! api_version = "v19.0"
//! app_id = "..."
//! app_secret = "..."  # or ADSYNC_GRAPH__APP_SECRET
//! timeout_secs = 30
//! requests_per_second = 10
//!
//! [sync]
//! workers = 4
//! max_retries = 5
//! cooldown_minutes = 10
//! cache_ttl_secs = 0
//!
//! [sync.cooldown_overrides]
//! ads = 30
//!
//! [store]
//! backend = "database"  # database | memory | redis
//! redis_url = "redis://127.0.0.1/"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use adsync::cooldown::{CooldownPolicy, DEFAULT_COOLDOWN_MINUTES};
use adsync::entity::sync_type::SyncType;
use adsync::graph::{DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, GraphConfig};
use adsync::retry::{MAX_RETRIES, RetryConfig};
use adsync::sync::{DEFAULT_WORKERS, SyncOptions};
use config::builder::DefaultState;
use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

const APP_NAME: &str = "adsync";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub graph: GraphSettings,
    pub sync: SyncConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    /// Defaults to `sqlite://~/.local/state/adsync/adsync.db` if not specified.
    pub url: Option<String>,
}

/// Graph API access.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub base_url: String,
    pub api_version: String,
    /// App credentials, needed for credential renewal only.
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub page_size: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Outbound request pacing; 0 disables it.
    pub requests_per_second: u32,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            app_id: None,
            app_secret: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: 30,
            requests_per_second: 10,
        }
    }
}

/// Worker pool, retry and cooldown settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub workers: usize,
    /// Attempts per throttled stage before giving up.
    pub max_retries: usize,
    pub cooldown_minutes: u64,
    /// Per-type cooldowns keyed by type name (`campaigns`, `ad_sets`, ...).
    pub cooldown_overrides: BTreeMap<String, u64>,
    /// Response cache lifetime; 0 disables the cache.
    pub cache_ttl_secs: u64,
    pub renew_credentials: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_retries: MAX_RETRIES,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            cooldown_overrides: BTreeMap::new(),
            cache_ttl_secs: 0,
            renew_credentials: true,
        }
    }
}

/// Backend of the shared key-value store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Database,
    Memory,
    Redis,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Key prefix in Redis.
    pub redis_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Database,
            redis_url: "redis://127.0.0.1/".to_string(),
            redis_prefix: format!("{APP_NAME}:"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/adsync/config.toml)
    /// 3. Local config file (./adsync.toml)
    /// 4. Environment variables with ADSYNC_ prefix
    ///
    /// A source that fails to parse is an error rather than a silent fall
    /// back to defaults, which would point commands at the wrong database.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("adsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./adsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., ADSYNC_DATABASE__URL -> database.url
        builder = builder.add_source(
            Environment::with_prefix("ADSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(builder: config::ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .build()
            .and_then(|settings| settings.try_deserialize::<Config>())
            .inspect_err(|e| tracing::warn!("Failed to load config: {}", e))
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("adsync.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            base_url: self.graph.base_url.clone(),
            api_version: self.graph.api_version.clone(),
            app_id: self.graph.app_id.clone(),
            app_secret: self.graph.app_secret.clone(),
            page_size: self.graph.page_size,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.graph.timeout_secs.max(1))
    }

    pub fn sync_options(&self) -> SyncOptions {
        let defaults = RetryConfig::default();
        SyncOptions {
            workers: self.sync.workers.max(1),
            retry: RetryConfig::new(defaults.min_delay, defaults.max_delay, self.sync.max_retries),
            renew_credentials: self.sync.renew_credentials,
        }
    }

    /// Cooldown policy. An override naming an unknown sync type is an error.
    pub fn cooldown_policy(&self) -> Result<CooldownPolicy, String> {
        let mut policy = CooldownPolicy {
            default_minutes: self.sync.cooldown_minutes,
            ..CooldownPolicy::default()
        };
        for (name, minutes) in &self.sync.cooldown_overrides {
            match name.parse::<SyncType>() {
                Ok(sync_type) => policy = policy.with_override(sync_type, *minutes),
                Err(e) => {
                    tracing::warn!(name = %name, "Invalid cooldown override: {}", e);
                    return Err(format!("sync.cooldown_overrides: {}", e));
                }
            }
        }
        Ok(policy)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.sync.cache_ttl_secs > 0).then(|| Duration::from_secs(self.sync.cache_ttl_secs))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/adsync` or `~/.local/state/adsync`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            // state_dir() returns None on macOS/Windows, fall back to data_dir
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_from_toml(toml_content: &str) -> Result<Config, ConfigError> {
        Config::from_builder(
            ConfigBuilder::builder()
                .add_source(config::File::from_str(toml_content, FileFormat::Toml)),
        )
    }

    fn from_toml(toml_content: &str) -> Config {
        try_from_toml(toml_content).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert_eq!(config.graph.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.sync.workers, DEFAULT_WORKERS);
        assert_eq!(config.sync.cooldown_minutes, 10);
        assert_eq!(config.store.backend, StoreBackend::Database);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.cache_ttl().is_none());
    }

    #[test]
    fn test_full_config_parsing() {
        let config = from_toml(
            r#"
            [database]
            url = "postgres://localhost/adsync"

            [graph]
            base_url = "https://graph.example.com"
            app_id = "123"
            app_secret = "shh"
            requests_per_second = 0

            [sync]
            workers = 8
            max_retries = 2
            cooldown_minutes = 15
            cache_ttl_secs = 300

            [sync.cooldown_overrides]
            ads = 30
            "ad-sets" = 20

            [store]
            backend = "redis"
            redis_url = "redis://cache:6379/"

            [server]
            bind = "0.0.0.0:9000"
            "#,
        );

        assert_eq!(
            config.database_url(),
            Some("postgres://localhost/adsync".to_string())
        );

        let graph = config.graph_config();
        assert_eq!(graph.base_url, "https://graph.example.com");
        assert_eq!(graph.api_version, DEFAULT_API_VERSION);
        assert_eq!(graph.app_secret.as_deref(), Some("shh"));
        assert_eq!(config.graph.requests_per_second, 0);

        let options = config.sync_options();
        assert_eq!(options.workers, 8);
        assert_eq!(options.retry.max_retries, 2);

        let policy = config.cooldown_policy().unwrap();
        assert_eq!(policy.default_minutes, 15);
        assert_eq!(policy.cooldown(SyncType::Ads), chrono::Duration::minutes(30));
        assert_eq!(policy.cooldown(SyncType::AdSets), chrono::Duration::minutes(20));
        assert_eq!(policy.cooldown(SyncType::Campaigns), chrono::Duration::minutes(15));

        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = from_toml(
            r#"
            [sync]
            workers = 2
            "#,
        );
        assert_eq!(config.sync.workers, 2);
        assert_eq!(config.sync.max_retries, MAX_RETRIES);
        assert!(config.sync.renew_credentials);
        assert_eq!(config.graph.timeout_secs, 30);
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let config = from_toml(
            r#"
            [sync.cooldown_overrides]
            creatives = 5
            "#,
        );
        let err = config.cooldown_policy().unwrap_err();
        assert!(err.contains("cooldown_overrides"), "{err}");
    }

    #[test]
    fn test_malformed_cooldown_section_is_an_error() {
        let err = try_from_toml(
            r#"
            [database]
            url = "postgres://localhost/adsync"

            [sync]
            cooldown_minutes = "ten"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cooldown_minutes"), "{err}");

        let err = try_from_toml(
            r#"
            [sync.cooldown_overrides]
            ads = "soon"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ads"), "{err}");
    }

    #[test]
    fn test_zero_workers_are_raised_to_one() {
        let config = from_toml(
            r#"
            [sync]
            workers = 0
            "#,
        );
        assert_eq!(config.sync_options().workers, 1);
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let url = Config::default().database_url().expect("default url");
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("adsync.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_default_state_dir() {
        let path = Config::default_state_dir().expect("state dir");
        assert!(path.to_string_lossy().contains("adsync"));
    }
}
