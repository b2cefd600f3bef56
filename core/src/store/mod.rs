//! Persistence contracts consumed by the mailbox engine
//!
//! The engine never owns mail long-term: a [`MessageStore`] and a
//! [`FolderRegistry`] are the systems of record. Both backends in
//! [`crate::storage`] implement the two traits on a single type.

use async_trait::async_trait;

use crate::error::WebmailResult;
use crate::folder::Folder;
use crate::message::{Message, MessageId};

/// Storage for individual messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Get a message by ID
    async fn get_message(&self, id: MessageId) -> WebmailResult<Option<Message>>;

    /// Get all of an owner's messages placed in `folder`
    async fn get_messages_in_folder(
        &self,
        owner: &str,
        folder: &str,
    ) -> WebmailResult<Vec<Message>>;

    /// Get every stored message whose sender is `sender`
    async fn get_messages_by_sender(&self, sender: &str) -> WebmailResult<Vec<Message>>;

    /// Persist a new message
    async fn save_message(&self, message: &Message) -> WebmailResult<()>;

    /// Overwrite an existing message, keyed by ID
    async fn update_message(&self, message: &Message) -> WebmailResult<()>;

    /// Permanently remove a message
    async fn delete_message(&self, id: MessageId) -> WebmailResult<()>;

    /// Permanently remove a message only if it currently sits in `folder`
    ///
    /// Returns whether a row was removed.
    async fn delete_if_in_folder(&self, id: MessageId, folder: &str) -> WebmailResult<bool>;

    /// Set the read flag
    async fn set_status(&self, id: MessageId, read: bool) -> WebmailResult<()>;

    /// Move an owner's message to another folder
    async fn move_to_folder(&self, id: MessageId, owner: &str, folder: &str) -> WebmailResult<()>;
}

/// Maps an owner to the folders it owns
#[async_trait]
pub trait FolderRegistry: Send + Sync {
    /// List an owner's folders in creation order
    async fn list_folders(&self, owner: &str) -> WebmailResult<Vec<Folder>>;

    /// Create a folder
    ///
    /// Creating a system folder that already exists as a system folder is a
    /// no-op; any other collision fails with `DuplicateFolder`.
    async fn create_folder(&self, owner: &str, name: &str, system: bool) -> WebmailResult<()>;

    /// Delete a folder row
    async fn delete_folder(&self, owner: &str, name: &str) -> WebmailResult<()>;

    /// Rename a folder, carrying its messages along
    async fn rename_folder(&self, owner: &str, old: &str, new: &str) -> WebmailResult<()>;

    /// Check whether an owner has a folder with this name
    async fn folder_exists(&self, owner: &str, name: &str) -> WebmailResult<bool>;
}
