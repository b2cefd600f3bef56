//! Configuration management for the webmail backend

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::FanOutPolicy;
use crate::error::{WebmailError, WebmailResult};

/// Log levels accepted in `[app] log_level`
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Storage backend
    pub storage: StorageConfig,
    /// Outgoing relay
    pub smtp: SmtpConfig,
    /// Incoming maildrop
    pub pop3: Pop3Config,
    /// Mailbox engine behaviour
    pub mailbox: MailboxConfig,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level
    pub log_level: String,
    /// Data directory; the platform default when unset
    pub data_dir: Option<PathBuf>,
}

/// Which storage backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file
    #[default]
    Sqlite,
    /// Process memory, lost on exit
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file; `<data dir>/webmail.db` when unset
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the SQLite database file path
    pub fn database_path(&self) -> WebmailResult<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::get_data_dir()?.join(crate::DB_FILENAME)),
        }
    }
}

/// SMTP relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Relay host; sending is disabled when empty
    pub host: String,
    pub port: u16,
    /// Upgrade the connection with STARTTLS
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

/// POP3 maildrop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pop3Config {
    /// Server host; fetching is disabled when empty
    pub host: String,
    pub port: u16,
    /// Connect over implicit TLS
    pub tls: bool,
    /// Login name; the mailbox owner when unset
    pub username: Option<String>,
    pub password: Option<String>,
    /// Remove messages from the server once retrieved
    pub delete_after_fetch: bool,
}

impl Pop3Config {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

/// Mailbox engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Reaction to a failed recipient when forwarding to several
    pub fan_out_policy: FanOutPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            starttls: true,
            username: None,
            password: None,
        }
    }
}

impl Default for Pop3Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 995,
            tls: true,
            username: None,
            password: None,
            delete_after_fetch: false,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_fan_out_policy(value: &str) -> Option<FanOutPolicy> {
    match value.to_lowercase().as_str() {
        "fail_fast" => Some(FanOutPolicy::FailFast),
        "best_effort" => Some(FanOutPolicy::BestEffort),
        _ => None,
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(config_path: &Path) -> WebmailResult<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            tracing::debug!(
                "No configuration at {}, using defaults",
                config_path.display()
            );
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, config_path: &Path) -> WebmailResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Override fields from `WEBMAIL_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(log_level) = std::env::var("WEBMAIL_LOG_LEVEL") {
            self.app.log_level = log_level;
        }

        if let Ok(data_dir) = std::env::var("WEBMAIL_DATA_DIR") {
            self.app.data_dir = Some(PathBuf::from(data_dir));
        }

        if let Ok(backend) = std::env::var("WEBMAIL_STORAGE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "sqlite" => self.storage.backend = StorageBackend::Sqlite,
                "memory" => self.storage.backend = StorageBackend::Memory,
                other => tracing::warn!("Ignoring unknown storage backend {}", other),
            }
        }

        if let Ok(path) = std::env::var("WEBMAIL_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(host) = std::env::var("WEBMAIL_SMTP_HOST") {
            self.smtp.host = host;
        }

        if let Ok(port) = std::env::var("WEBMAIL_SMTP_PORT") {
            if let Ok(port) = port.parse() {
                self.smtp.port = port;
            }
        }

        if let Ok(starttls) = std::env::var("WEBMAIL_SMTP_STARTTLS") {
            self.smtp.starttls = parse_bool(&starttls);
        }

        if let Ok(username) = std::env::var("WEBMAIL_SMTP_USERNAME") {
            self.smtp.username = Some(username);
        }

        if let Ok(password) = std::env::var("WEBMAIL_SMTP_PASSWORD") {
            self.smtp.password = Some(password);
        }

        if let Ok(host) = std::env::var("WEBMAIL_POP3_HOST") {
            self.pop3.host = host;
        }

        if let Ok(port) = std::env::var("WEBMAIL_POP3_PORT") {
            if let Ok(port) = port.parse() {
                self.pop3.port = port;
            }
        }

        if let Ok(tls) = std::env::var("WEBMAIL_POP3_TLS") {
            self.pop3.tls = parse_bool(&tls);
        }

        if let Ok(username) = std::env::var("WEBMAIL_POP3_USERNAME") {
            self.pop3.username = Some(username);
        }

        if let Ok(password) = std::env::var("WEBMAIL_POP3_PASSWORD") {
            self.pop3.password = Some(password);
        }

        if let Ok(delete) = std::env::var("WEBMAIL_POP3_DELETE_AFTER_FETCH") {
            self.pop3.delete_after_fetch = parse_bool(&delete);
        }

        if let Ok(policy) = std::env::var("WEBMAIL_FAN_OUT_POLICY") {
            match parse_fan_out_policy(&policy) {
                Some(policy) => self.mailbox.fan_out_policy = policy,
                None => tracing::warn!("Ignoring unknown fan-out policy {}", policy),
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> WebmailResult<PathBuf> {
        Ok(crate::get_config_dir()?.join(crate::CONFIG_FILENAME))
    }

    /// Storage settings with the database path resolved against `[app] data_dir`
    pub fn storage_config(&self) -> StorageConfig {
        let mut storage = self.storage.clone();
        if storage.database_path.is_none() {
            if let Some(data_dir) = &self.app.data_dir {
                storage.database_path = Some(data_dir.join(crate::DB_FILENAME));
            }
        }
        storage
    }

    /// Validate the configuration
    pub fn validate(&self) -> WebmailResult<()> {
        if !LOG_LEVELS.contains(&self.app.log_level.to_lowercase().as_str()) {
            return Err(WebmailError::config(format!(
                "Unknown log level: {}",
                self.app.log_level
            )));
        }

        if self.smtp.is_configured() {
            if self.smtp.port == 0 {
                return Err(WebmailError::config("SMTP port cannot be zero"));
            }
            if self.smtp.username.is_some() != self.smtp.password.is_some() {
                return Err(WebmailError::config(
                    "SMTP username and password must be set together",
                ));
            }
        }

        if self.pop3.is_configured() {
            if self.pop3.port == 0 {
                return Err(WebmailError::config("POP3 port cannot be zero"));
            }
            if self.pop3.password.is_none() {
                return Err(WebmailError::config("POP3 password is required"));
            }
        }

        if let Some(data_dir) = &self.app.data_dir {
            if !data_dir.exists() {
                std::fs::create_dir_all(data_dir)
                    .map_err(|_| WebmailError::DataDirCreateFailed(data_dir.clone()))?;
            }
        }

        Ok(())
    }
}
