//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development (apart from `RELEASE_VERSION`, which
//! production servers must set).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use histsync_shared::constants::{DEFAULT_HTTP_PORT, UNKNOWN_VERSION};

/// Database path that selects a private in-memory store.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file, or `:memory:`.
    /// Env: `DATABASE_PATH`
    /// Default: `./histsync.db`
    pub database_path: PathBuf,

    /// Test mode mounts the wipe-db endpoint and tolerates an unknown
    /// release version at startup.
    /// Env: `HISTSYNC_TEST` (any non-empty value)
    /// Default: `false`
    pub test_mode: bool,

    /// Release version advertised until the resolver finds a newer one.
    /// Env: `RELEASE_VERSION`
    /// Default: `UNKNOWN`
    pub release_version: String,

    /// Upstream "latest release" API.
    /// Env: `RELEASE_FEED_URL`
    pub release_feed_url: String,

    /// Base URL under which release artifacts are published, one directory
    /// per version tag.
    /// Env: `RELEASE_DOWNLOAD_BASE`
    pub release_download_base: String,

    /// Delay before the first janitor cycle.
    /// Env: `CRON_INITIAL_DELAY_SECS`
    /// Default: 5 seconds
    pub cron_initial_delay: Duration,

    /// Interval between janitor cycles. Must be non-zero.
    /// Env: `CRON_INTERVAL_SECS`
    /// Default: 10 minutes
    pub cron_interval: Duration,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`. Only
    /// enable behind a reverse proxy that overwrites these headers; otherwise
    /// any caller can choose its recorded registration address.
    /// Env: `TRUST_PROXY_HEADERS` (any non-empty value)
    /// Default: `false`
    pub trust_proxy_headers: bool,

    /// Basic-auth username for the internal usage report.
    /// Env: `USAGE_STATS_USER`
    /// Default: unset (report disabled).
    pub usage_stats_user: Option<String>,

    /// Hex BLAKE3 digest of the usage report password.
    /// Env: `USAGE_STATS_PASSWORD_HASH`
    /// Default: unset (report disabled).
    pub usage_stats_password_hash: Option<String>,

    /// Maximum request body size in bytes (dumps can be large).
    /// Env: `MAX_BODY_SIZE`
    /// Default: 100 MiB
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./histsync.db"),
            test_mode: false,
            release_version: UNKNOWN_VERSION.to_string(),
            release_feed_url: "https://api.github.com/repos/histsync/histsync/releases/latest"
                .to_string(),
            release_download_base: "https://github.com/histsync/histsync/releases/download"
                .to_string(),
            cron_initial_delay: Duration::from_secs(5),
            cron_interval: Duration::from_secs(600),
            trust_proxy_headers: false,
            usage_stats_user: None,
            usage_stats_password_hash: None,
            max_body_size: 100 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(val) = var("HISTSYNC_TEST") {
            config.test_mode = !val.is_empty();
        }

        if let Some(version) = var("RELEASE_VERSION") {
            if !version.is_empty() {
                config.release_version = version;
            }
        }

        if let Some(url) = var("RELEASE_FEED_URL") {
            config.release_feed_url = url;
        }

        if let Some(url) = var("RELEASE_DOWNLOAD_BASE") {
            config.release_download_base = url;
        }

        if let Some(secs) = parse_secs(&var, "CRON_INITIAL_DELAY_SECS") {
            config.cron_initial_delay = secs;
        }

        if let Some(secs) = parse_secs(&var, "CRON_INTERVAL_SECS") {
            if secs.is_zero() {
                tracing::warn!("CRON_INTERVAL_SECS must be non-zero, using default");
            } else {
                config.cron_interval = secs;
            }
        }

        if let Some(val) = var("TRUST_PROXY_HEADERS") {
            config.trust_proxy_headers = !val.is_empty();
        }

        config.usage_stats_user = var("USAGE_STATS_USER").filter(|v| !v.is_empty());
        config.usage_stats_password_hash = var("USAGE_STATS_PASSWORD_HASH")
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());

        if let Some(val) = var("MAX_BODY_SIZE") {
            match val.parse::<usize>() {
                Ok(n) => config.max_body_size = n,
                Err(_) => tracing::warn!(value = %val, "Invalid MAX_BODY_SIZE, using default"),
            }
        }

        config
    }

    /// Whether the configured database lives in memory only.
    pub fn in_memory_database(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_DATABASE
    }

    /// Whether the internal usage report has credentials configured.
    pub fn usage_stats_enabled(&self) -> bool {
        self.usage_stats_user.is_some() && self.usage_stats_password_hash.is_some()
    }
}

fn parse_secs(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let val = var(key)?;
    match val.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %val, "Invalid duration, using default");
            None
        }
    }
}
