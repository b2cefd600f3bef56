//! Storage backends for the webmail core

pub mod database;
pub mod memory;
pub mod migrations;

pub use database::Database;
pub use memory::MemoryStore;
pub use migrations::MigrationManager;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::WebmailResult;
use crate::store::{FolderRegistry, MessageStore};

/// The two storage collaborators, backed by one shared instance
#[derive(Clone)]
pub struct Storage {
    pub messages: Arc<dyn MessageStore>,
    pub folders: Arc<dyn FolderRegistry>,
}

impl Storage {
    /// Wrap a single backend that implements both traits
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: MessageStore + FolderRegistry + 'static,
    {
        Self {
            messages: backend.clone(),
            folders: backend,
        }
    }

    /// Open the backend selected by configuration
    pub async fn open(config: &StorageConfig) -> WebmailResult<Self> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory storage");
                Ok(Self::from_backend(Arc::new(MemoryStore::new())))
            }
            StorageBackend::Sqlite => {
                let path = config.database_path()?;
                tracing::info!("Using SQLite storage at {}", path.display());
                let database = Database::new(path).await?;
                database.initialize().await?;
                Ok(Self::from_backend(Arc::new(database)))
            }
        }
    }
}
