//! Error types for the webmail core

use std::path::PathBuf;

/// Result type alias for webmail operations
pub type WebmailResult<T> = Result<T, WebmailError>;

/// Main error type for the webmail core
#[derive(Debug, thiserror::Error)]
pub enum WebmailError {
    /// Message, folder or draft does not exist or is not the caller's
    #[error("Not found: {0}")]
    NotFound(String),

    /// Folder name collision on create or rename
    #[error("Folder already exists: {0}")]
    DuplicateFolder(String),

    /// Delete or rename attempted on a system folder
    #[error("Folder is protected: {0}")]
    ProtectedFolder(String),

    /// Mail transfer collaborator reported an error
    #[error("Transport error: {0}")]
    Transport(String),

    /// SMTP transport errors
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Outgoing message could not be built
    #[error("Message build error: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Address parsing errors
    #[error("Address parsing error: {0}")]
    AddressParsing(#[from] lettre::address::AddressError),

    /// Fetched message could not be parsed
    #[error("MIME parsing error: {0}")]
    Mime(#[from] mailparse::MailParseError),

    /// Some recipients of a best-effort fan-out were not reached
    #[error("Delivery failed for: {}", failed.join(", "))]
    PartialDelivery { failed: Vec<String> },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Other store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Database migration error
    #[error("Database migration error: {0}")]
    DatabaseMigration(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    ConfigDirCreateFailed(PathBuf),

    /// Failed to create data directory
    #[error("Failed to create data directory: {0}")]
    DataDirCreateFailed(PathBuf),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl WebmailError {
    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new duplicate folder error
    pub fn duplicate_folder(name: impl Into<String>) -> Self {
        Self::DuplicateFolder(name.into())
    }

    /// Create a new protected folder error
    pub fn protected_folder(name: impl Into<String>) -> Self {
        Self::ProtectedFolder(name.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if the mail transfer collaborator caused this error
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Smtp(_)
                | Self::MessageBuild(_)
                | Self::AddressParsing(_)
                | Self::Mime(_)
                | Self::PartialDelivery { .. }
        )
    }

    /// Check if the message store or folder registry caused this error
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Store(_) | Self::DatabaseMigration(_)
        )
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(WebmailError::transport("connection refused").is_transport_failure());
        assert!(WebmailError::PartialDelivery {
            failed: vec!["a@test.com".to_string()],
        }
        .is_transport_failure());
        assert!(WebmailError::store("disk full").is_store_failure());
        assert!(!WebmailError::not_found("x").is_store_failure());
        assert!(WebmailError::not_found("x").is_not_found());
    }

    #[test]
    fn test_partial_delivery_message() {
        let err = WebmailError::PartialDelivery {
            failed: vec!["a@test.com".to_string(), "b@test.com".to_string()],
        };
        assert_eq!(err.to_string(), "Delivery failed for: a@test.com, b@test.com");
    }
}
