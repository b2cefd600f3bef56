//! Webmail Core Library
//!
//! This crate contains the mailbox lifecycle engine of the webmail backend:
//! - Domain models (Folder, Message, MessageView)
//! - Persistence contracts and their SQLite and in-memory backends
//! - Folder bootstrap, two-phase delete, drafts and forward/reply
//! - SMTP/POP3 mail transfer and an in-process identity service

pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod folder;
pub mod identity;
pub mod message;
pub mod storage;
pub mod store;
pub mod transfer;

// Re-export commonly used types
pub use config::Config;
pub use engine::{DeleteOutcome, FanOutPolicy, MailboxEngine};
pub use error::{WebmailError, WebmailResult};
pub use folder::{Folder, SystemFolder};
pub use identity::{IdentityService, Session, SessionStore};
pub use message::{Direction, DraftContent, Message, MessageId, MessageView, OutgoingMail};
pub use storage::{Database, MemoryStore, Storage};
pub use store::{FolderRegistry, MessageStore};
pub use transfer::{MailTransfer, SmtpPop3Transfer};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Webmail";

/// Default configuration and data directory name
pub const CONFIG_DIR_NAME: &str = "webmail";

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "config.toml";

/// Default database filename
pub const DB_FILENAME: &str = "webmail.db";

/// Build an engine from configuration: open storage and the transfer adapter
pub async fn open_engine(config: &Config) -> WebmailResult<MailboxEngine> {
    tracing::info!("Initializing {} core v{}", APP_NAME, VERSION);

    let storage = Storage::open(&config.storage_config()).await?;
    let transfer = SmtpPop3Transfer::new(&config.smtp, &config.pop3)?;

    Ok(MailboxEngine::with_storage(storage, std::sync::Arc::new(transfer))
        .with_fan_out_policy(config.mailbox.fan_out_policy))
}

/// Get the default configuration directory
pub fn get_config_dir() -> WebmailResult<std::path::PathBuf> {
    let config_dir = std::env::var("WEBMAIL_CONFIG_DIR")
        .map(std::path::PathBuf::from)
        .or_else(|_| {
            directories::ProjectDirs::from("", "", CONFIG_DIR_NAME)
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap_or_else(|_| std::path::PathBuf::from(".webmail"));

    std::fs::create_dir_all(&config_dir)
        .map_err(|_| WebmailError::ConfigDirCreateFailed(config_dir.clone()))?;

    Ok(config_dir)
}

/// Get the default data directory
pub fn get_data_dir() -> WebmailResult<std::path::PathBuf> {
    let data_dir = std::env::var("WEBMAIL_DATA_DIR")
        .map(std::path::PathBuf::from)
        .or_else(|_| {
            directories::ProjectDirs::from("", "", CONFIG_DIR_NAME)
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap_or_else(|_| std::path::PathBuf::from(".webmail"));

    std::fs::create_dir_all(&data_dir)
        .map_err(|_| WebmailError::DataDirCreateFailed(data_dir.clone()))?;

    Ok(data_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;

    #[tokio::test]
    async fn test_open_engine_with_memory_storage() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config.mailbox.fan_out_policy = FanOutPolicy::BestEffort;

        let engine = open_engine(&config).await.unwrap();
        assert_eq!(engine.fan_out_policy(), FanOutPolicy::BestEffort);

        let folders = engine.get_folders("alice@test.com").await.unwrap();
        assert_eq!(folders.len(), SystemFolder::ALL.len());

        // No SMTP host configured
        let mail = OutgoingMail::new("alice@test.com", "bob@test.com", "Hi", "Hello");
        assert!(engine.send_email(&mail).await.unwrap_err().is_transport_failure());
    }
}
