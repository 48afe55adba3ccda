use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Development-only signing key. `validate` warns when it is still in use.
pub const DEV_SECRET_KEY: &str = "you-will-never-guess";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub audit: AuditConfig,

    pub notifications: NotificationConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/incidentry.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    pub session_inactivity_minutes: i64,

    /// Externally reachable origin, used to build password reset links.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
            secure_cookies: true,
            session_inactivity_minutes: 60,
            public_base_url: "http://localhost:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key used to sign password reset tokens.
    pub secret_key: String,

    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    pub min_password_length: usize,

    pub reset_token_ttl_seconds: i64,

    /// How long a password-verified login may wait for its second factor.
    pub pending_login_ttl_seconds: i64,

    pub lockout: LockoutConfig,

    pub totp: TotpConfig,

    pub login_rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: DEV_SECRET_KEY.to_string(),
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_password_length: 6,
            reset_token_ttl_seconds: 600,
            pending_login_ttl_seconds: 300,
            lockout: LockoutConfig::default(),
            totp: TotpConfig::default(),
            login_rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Per-client cap on login submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Requests allowed per client inside one window.
    pub max_requests: u32,

    pub window_seconds: u64,

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address. Only safe behind a proxy that sets these headers.
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 10,
            window_seconds: 60,
            trust_forwarded_headers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins before the account is locked.
    pub max_attempts: u32,

    /// Lock window once max attempts is reached.
    pub lockout_seconds: i64,

    /// Report the exact unlock time to the caller. When false a locked account
    /// gets the same response as a bad password.
    pub disclose_lock_until: bool,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_seconds: 60,
            disclose_lock_until: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpConfig {
    pub issuer: String,

    /// Accepted clock drift, in time steps either side of now.
    pub skew_steps: u8,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "IncidentTracker".to_string(),
            skew_steps: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Also audit registrations and completed logins.
    pub record_auth_events: bool,

    pub listing_limit: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            record_auth_events: false,
            listing_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationTransport {
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    pub transport: NotificationTransport,

    pub webhook_url: Option<String>,

    pub sender: String,

    pub request_timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: NotificationTransport::Log,
            webhook_url: None,
            sender: "noreply@incidentry.local".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub json_logs: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "incidentry".to_string());

        Self {
            metrics_enabled: true,
            json_logs: false,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            audit: AuditConfig::default(),
            notifications: NotificationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies `INCIDENTRY_*` overrides using the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("INCIDENTRY_SECRET_KEY") {
            self.security.secret_key = secret;
        }

        if let Some(url) = lookup("INCIDENTRY_DATABASE_URL") {
            self.general.database_path = url;
        }

        if let Some(port) = lookup("INCIDENTRY_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid INCIDENTRY_PORT: {port}"))?;
        }

        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("incidentry").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".incidentry").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.secret_key.trim().is_empty() {
            anyhow::bail!("security.secret_key cannot be empty");
        }

        if self.security.secret_key == DEV_SECRET_KEY {
            warn!("security.secret_key is the development default; set INCIDENTRY_SECRET_KEY");
        }

        if self.security.lockout.max_attempts == 0 {
            anyhow::bail!("security.lockout.max_attempts must be > 0");
        }

        if self.security.lockout.lockout_seconds <= 0 {
            anyhow::bail!("security.lockout.lockout_seconds must be > 0");
        }

        if self.security.reset_token_ttl_seconds <= 0 {
            anyhow::bail!("security.reset_token_ttl_seconds must be > 0");
        }

        if self.security.pending_login_ttl_seconds <= 0 {
            anyhow::bail!("security.pending_login_ttl_seconds must be > 0");
        }

        let rate_limit = &self.security.login_rate_limit;
        if rate_limit.enabled && (rate_limit.max_requests == 0 || rate_limit.window_seconds == 0) {
            anyhow::bail!("security.login_rate_limit needs max_requests and window_seconds > 0");
        }

        if self.security.totp.skew_steps > 10 {
            anyhow::bail!("security.totp.skew_steps cannot exceed 10");
        }

        if self.general.min_db_connections > self.general.max_db_connections {
            anyhow::bail!("general.min_db_connections cannot exceed max_db_connections");
        }

        if self.notifications.enabled
            && self.notifications.transport == NotificationTransport::Webhook
            && self
                .notifications
                .webhook_url
                .as_deref()
                .is_none_or(|u| u.trim().is_empty())
        {
            anyhow::bail!("notifications.webhook_url is required for the webhook transport");
        }

        Ok(())
    }

    #[must_use]
    pub fn lock_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.security.lockout.lockout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security.lockout.max_attempts, 5);
        assert_eq!(config.security.lockout.lockout_seconds, 60);
        assert_eq!(config.security.reset_token_ttl_seconds, 600);
        assert_eq!(config.security.totp.issuer, "IncidentTracker");
        assert!(!config.audit.record_auth_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[security.lockout]"));
        assert!(toml_str.contains("[notifications]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [security.lockout]
            max_attempts = 3
            lockout_seconds = 900
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.security.lockout.max_attempts, 3);
        assert_eq!(config.lock_duration(), chrono::Duration::minutes(15));

        assert_eq!(config.server.port, 5000);
        assert!(config.security.lockout.disclose_lock_until);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| match key {
                "INCIDENTRY_SECRET_KEY" => Some("from-env".to_string()),
                "INCIDENTRY_PORT" => Some("8080".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.security.secret_key, "from-env");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.general.database_path, "sqlite:data/incidentry.db");

        let bad_port = config.apply_env_overrides(|key| {
            (key == "INCIDENTRY_PORT").then(|| "not-a-port".to_string())
        });
        assert!(bad_port.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let mut config = Config::default();
        config.security.lockout.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notifications.transport = NotificationTransport::Webhook;
        assert!(config.validate().is_err());
        config.notifications.webhook_url = Some("http://hooks.local/mail".to_string());
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.security.login_rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
        config.security.login_rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }
}
