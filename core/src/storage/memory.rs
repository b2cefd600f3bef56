//! In-memory storage backend
//!
//! Owned by whoever constructs it and dropped with it. Every check-and-act
//! sequence runs under one write lock, so folder uniqueness and the
//! conditional Trash delete are atomic within this process.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{WebmailError, WebmailResult};
use crate::folder::Folder;
use crate::message::{Message, MessageId};
use crate::store::{FolderRegistry, MessageStore};

#[derive(Default)]
struct MemoryState {
    /// Messages keyed by ID, with an insertion sequence for stable ordering
    messages: HashMap<MessageId, (u64, Message)>,
    /// Folders per owner in creation order
    folders: HashMap<String, Vec<Folder>>,
    next_seq: u64,
}

impl MemoryState {
    fn message_mut(&mut self, id: MessageId) -> WebmailResult<&mut Message> {
        self.messages
            .get_mut(&id)
            .map(|(_, message)| message)
            .ok_or_else(|| WebmailError::not_found(format!("Message {}", id)))
    }

    fn collect<F>(&self, filter: F) -> Vec<Message>
    where
        F: Fn(&Message) -> bool,
    {
        let mut found: Vec<&(u64, Message)> = self
            .messages
            .values()
            .filter(|(_, message)| filter(message))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, message)| message.clone()).collect()
    }
}

/// Lock-guarded in-memory message store and folder registry
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages across all owners
    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_message(&self, id: MessageId) -> WebmailResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state.messages.get(&id).map(|(_, message)| message.clone()))
    }

    async fn get_messages_in_folder(
        &self,
        owner: &str,
        folder: &str,
    ) -> WebmailResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state.collect(|m| m.owner == owner && m.folder == folder))
    }

    async fn get_messages_by_sender(&self, sender: &str) -> WebmailResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state.collect(|m| m.sender == sender))
    }

    async fn save_message(&self, message: &Message) -> WebmailResult<()> {
        let mut state = self.state.write().await;

        if state.messages.contains_key(&message.id) {
            return Err(WebmailError::store(format!(
                "Message {} already exists",
                message.id
            )));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.messages.insert(message.id, (seq, message.clone()));
        Ok(())
    }

    async fn update_message(&self, message: &Message) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        let stored = state.message_mut(message.id)?;
        *stored = message.clone();
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        state
            .messages
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| WebmailError::not_found(format!("Message {}", id)))
    }

    async fn delete_if_in_folder(&self, id: MessageId, folder: &str) -> WebmailResult<bool> {
        let mut state = self.state.write().await;

        let in_folder = state
            .messages
            .get(&id)
            .map(|(_, message)| message.folder == folder)
            .unwrap_or(false);

        if in_folder {
            state.messages.remove(&id);
        }

        Ok(in_folder)
    }

    async fn set_status(&self, id: MessageId, read: bool) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        state.message_mut(id)?.read = read;
        Ok(())
    }

    async fn move_to_folder(&self, id: MessageId, owner: &str, folder: &str) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        let message = state.message_mut(id)?;

        if !message.is_owned_by(owner) {
            return Err(WebmailError::not_found(format!("Message {}", id)));
        }

        message.folder = folder.to_string();
        Ok(())
    }
}

#[async_trait]
impl FolderRegistry for MemoryStore {
    async fn list_folders(&self, owner: &str) -> WebmailResult<Vec<Folder>> {
        let state = self.state.read().await;
        Ok(state.folders.get(owner).cloned().unwrap_or_default())
    }

    async fn create_folder(&self, owner: &str, name: &str, system: bool) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        let folders = state.folders.entry(owner.to_string()).or_default();

        if let Some(existing) = folders.iter().find(|f| f.name == name) {
            if system && existing.system {
                return Ok(());
            }
            return Err(WebmailError::duplicate_folder(name));
        }

        let folder = if system {
            match crate::folder::SystemFolder::from_name(name) {
                Some(kind) => Folder::new_system(owner, kind),
                None => {
                    return Err(WebmailError::validation(format!(
                        "{} is not a system folder",
                        name
                    )))
                }
            }
        } else {
            Folder::new_custom(owner, name)
        };

        folders.push(folder);
        Ok(())
    }

    async fn delete_folder(&self, owner: &str, name: &str) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        let folders = state.folders.entry(owner.to_string()).or_default();

        let before = folders.len();
        folders.retain(|f| f.name != name);

        if folders.len() == before {
            return Err(WebmailError::not_found(format!("Folder {}", name)));
        }

        Ok(())
    }

    async fn rename_folder(&self, owner: &str, old: &str, new: &str) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        let folders = state.folders.entry(owner.to_string()).or_default();

        if folders.iter().any(|f| f.name == new) {
            return Err(WebmailError::duplicate_folder(new));
        }

        let folder = folders
            .iter_mut()
            .find(|f| f.name == old)
            .ok_or_else(|| WebmailError::not_found(format!("Folder {}", old)))?;
        folder.name = new.to_string();

        for (_, message) in state.messages.values_mut() {
            if message.owner == owner && message.folder == old {
                message.folder = new.to_string();
            }
        }

        Ok(())
    }

    async fn folder_exists(&self, owner: &str, name: &str) -> WebmailResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .folders
            .get(owner)
            .map(|folders| folders.iter().any(|f| f.name == name))
            .unwrap_or(false))
    }
}
