//! Mailbox lifecycle engine
//!
//! Folder bootstrap and management, message placement, the two-phase
//! delete, the draft lifecycle and forward/reply. The engine holds no mail
//! state of its own: every operation is a short sequence of calls against
//! the [`MessageStore`], the [`FolderRegistry`] and the [`MailTransfer`]
//! collaborator, and errors from them are returned unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::compose;
use crate::error::{WebmailError, WebmailResult};
use crate::folder::{display_order, validate_folder_name, Folder, SystemFolder};
use crate::message::{DraftContent, Message, MessageId, MessageView, OutgoingMail};
use crate::storage::Storage;
use crate::store::{FolderRegistry, MessageStore};
use crate::transfer::MailTransfer;

/// How a multi-recipient send reacts to a failed recipient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    /// Stop at the first failed recipient and return its error
    #[default]
    FailFast,
    /// Try every recipient, then report the ones that failed
    BestEffort,
}

/// Per-id result of [`MailboxEngine::delete_emails`]
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    /// Moved into Trash
    pub trashed: Vec<MessageId>,
    /// Permanently removed from Trash
    pub destroyed: Vec<MessageId>,
    /// Ids that could not be processed
    pub failed: Vec<(MessageId, WebmailError)>,
}

impl DeleteOutcome {
    /// Check whether every id was processed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn the first failure, if any, into an error
    pub fn into_result(self) -> WebmailResult<()> {
        match self.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

/// Orchestrates mailbox operations for already-authenticated owners
pub struct MailboxEngine {
    messages: Arc<dyn MessageStore>,
    folders: Arc<dyn FolderRegistry>,
    transfer: Arc<dyn MailTransfer>,
    fan_out: FanOutPolicy,
}

impl MailboxEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        messages: Arc<dyn MessageStore>,
        folders: Arc<dyn FolderRegistry>,
        transfer: Arc<dyn MailTransfer>,
    ) -> Self {
        Self {
            messages,
            folders,
            transfer,
            fan_out: FanOutPolicy::default(),
        }
    }

    /// Create an engine over an opened storage backend
    pub fn with_storage(storage: Storage, transfer: Arc<dyn MailTransfer>) -> Self {
        Self::new(storage.messages, storage.folders, transfer)
    }

    /// Set the multi-recipient send policy
    pub fn with_fan_out_policy(mut self, policy: FanOutPolicy) -> Self {
        self.fan_out = policy;
        self
    }

    pub fn fan_out_policy(&self) -> FanOutPolicy {
        self.fan_out
    }

    // Folders

    /// List the owner's folders, creating any missing system folder first
    ///
    /// System folders come first in canonical order, then custom folders in
    /// registry order.
    pub async fn get_folders(&self, owner: &str) -> WebmailResult<Vec<Folder>> {
        let existing = self.folders.list_folders(owner).await?;

        let folders = if self.create_missing_system_folders(owner, &existing).await? {
            self.folders.list_folders(owner).await?
        } else {
            existing
        };

        Ok(display_order(folders))
    }

    /// Create whichever system folders are absent; returns whether any were
    async fn create_missing_system_folders(
        &self,
        owner: &str,
        existing: &[Folder],
    ) -> WebmailResult<bool> {
        let missing: Vec<SystemFolder> = SystemFolder::ALL
            .into_iter()
            .filter(|kind| !existing.iter().any(|f| f.system_kind() == Some(*kind)))
            .collect();

        if missing.is_empty() {
            return Ok(false);
        }

        tracing::info!(
            "Creating {} missing system folders for {}",
            missing.len(),
            owner
        );
        for kind in missing {
            self.folders.create_folder(owner, kind.name(), true).await?;
        }

        Ok(true)
    }

    async fn ensure_system_folders(&self, owner: &str) -> WebmailResult<()> {
        let existing = self.folders.list_folders(owner).await?;
        self.create_missing_system_folders(owner, &existing).await?;
        Ok(())
    }

    /// System folders always exist; custom ones must be registered
    async fn folder_exists(&self, owner: &str, name: &str) -> WebmailResult<bool> {
        if SystemFolder::is_system_name(name) {
            return Ok(true);
        }
        self.folders.folder_exists(owner, name).await
    }

    /// Create a custom folder
    pub async fn create_folder(&self, owner: &str, name: &str) -> WebmailResult<()> {
        validate_folder_name(name)?;

        if SystemFolder::is_system_name(name) {
            return Err(WebmailError::duplicate_folder(name));
        }

        self.folders.create_folder(owner, name, false).await?;
        tracing::info!("Created folder {} for {}", name, owner);
        Ok(())
    }

    /// Delete a custom folder, moving its messages to Trash first
    pub async fn delete_folder(&self, owner: &str, name: &str) -> WebmailResult<()> {
        if SystemFolder::is_system_name(name) {
            return Err(WebmailError::protected_folder(name));
        }

        if !self.folders.folder_exists(owner, name).await? {
            return Err(WebmailError::not_found(format!("Folder {}", name)));
        }

        self.ensure_system_folders(owner).await?;

        let contents = self.messages.get_messages_in_folder(owner, name).await?;
        if !contents.is_empty() {
            tracing::info!(
                "Moving {} messages from {} to Trash before deleting it",
                contents.len(),
                name
            );
        }
        for message in &contents {
            self.messages
                .move_to_folder(message.id, owner, SystemFolder::Trash.name())
                .await?;
        }

        self.folders.delete_folder(owner, name).await?;
        tracing::info!("Deleted folder {} for {}", name, owner);
        Ok(())
    }

    /// Rename a custom folder; its messages follow
    pub async fn rename_folder(&self, owner: &str, old: &str, new: &str) -> WebmailResult<()> {
        if SystemFolder::is_system_name(old) {
            return Err(WebmailError::protected_folder(old));
        }

        validate_folder_name(new)?;

        if !self.folders.folder_exists(owner, old).await? {
            return Err(WebmailError::not_found(format!("Folder {}", old)));
        }

        if SystemFolder::is_system_name(new) {
            return Err(WebmailError::duplicate_folder(new));
        }

        self.folders.rename_folder(owner, old, new).await?;
        tracing::info!("Renamed folder {} to {} for {}", old, new, owner);
        Ok(())
    }

    // Retrieval

    /// Messages in the owner's Inbox, newest first
    pub async fn inbox(&self, owner: &str) -> WebmailResult<Vec<MessageView>> {
        self.get_folder_emails(owner, SystemFolder::Inbox.name()).await
    }

    /// Messages in the owner's Sent folder, newest first
    pub async fn get_sent_emails(&self, owner: &str) -> WebmailResult<Vec<MessageView>> {
        self.get_folder_emails(owner, SystemFolder::Sent.name()).await
    }

    /// Messages in one of the owner's folders, newest first
    pub async fn get_folder_emails(
        &self,
        owner: &str,
        folder: &str,
    ) -> WebmailResult<Vec<MessageView>> {
        if !self.folder_exists(owner, folder).await? {
            return Err(WebmailError::not_found(format!("Folder {}", folder)));
        }

        let messages = self.messages.get_messages_in_folder(owner, folder).await?;
        Ok(views_for(newest_first(messages), owner))
    }

    /// Every message the owner sent, across folders, newest first
    pub async fn get_outgoing(&self, owner: &str) -> WebmailResult<Vec<MessageView>> {
        let messages = self
            .messages
            .get_messages_by_sender(owner)
            .await?
            .into_iter()
            .filter(|m| m.is_owned_by(owner))
            .collect();

        Ok(views_for(newest_first(messages), owner))
    }

    /// One of the owner's messages
    pub async fn get_email(&self, owner: &str, id: MessageId) -> WebmailResult<MessageView> {
        let message = self.owned_message(owner, id).await?;
        Ok(MessageView::for_viewer(&message, owner))
    }

    async fn owned_message(&self, owner: &str, id: MessageId) -> WebmailResult<Message> {
        match self.messages.get_message(id).await? {
            Some(message) if message.is_owned_by(owner) => Ok(message),
            _ => Err(WebmailError::not_found(format!("Message {}", id))),
        }
    }

    // Placement

    /// Move one of the owner's messages to another existing folder
    pub async fn change_email_folder(
        &self,
        id: MessageId,
        owner: &str,
        folder: &str,
    ) -> WebmailResult<()> {
        if !self.folder_exists(owner, folder).await? {
            return Err(WebmailError::not_found(format!("Folder {}", folder)));
        }

        self.messages.move_to_folder(id, owner, folder).await
    }

    /// Set the read flag
    pub async fn change_status(&self, id: MessageId, read: bool) -> WebmailResult<()> {
        self.messages.set_status(id, read).await
    }

    /// Two-phase delete
    ///
    /// Messages outside Trash are moved there; messages already in Trash are
    /// destroyed. Each id is decided by the message's stored folder, and a
    /// failure on one id does not stop the others. A repeated id is acted on
    /// once, so one call never takes a message from a folder to destroyed.
    pub async fn delete_emails(
        &self,
        owner: &str,
        ids: &[MessageId],
        current_folder: &str,
    ) -> WebmailResult<DeleteOutcome> {
        self.ensure_system_folders(owner).await?;

        let trash = SystemFolder::Trash.name();
        let mut outcome = DeleteOutcome::default();
        let mut seen = HashSet::with_capacity(ids.len());

        for &id in ids {
            if !seen.insert(id) {
                continue;
            }

            let message = match self.owned_message(owner, id).await {
                Ok(message) => message,
                Err(err) => {
                    outcome.failed.push((id, err));
                    continue;
                }
            };

            if message.folder != current_folder {
                tracing::debug!(
                    "Message {} is in {}, caller saw it in {}",
                    id,
                    message.folder,
                    current_folder
                );
            }

            if message.is_in(SystemFolder::Trash) {
                match self.messages.delete_if_in_folder(id, trash).await {
                    Ok(true) => outcome.destroyed.push(id),
                    Ok(false) => outcome.failed.push((
                        id,
                        WebmailError::not_found(format!("Message {} is no longer in Trash", id)),
                    )),
                    Err(err) => outcome.failed.push((id, err)),
                }
            } else {
                match self.messages.move_to_folder(id, owner, trash).await {
                    Ok(()) => outcome.trashed.push(id),
                    Err(err) => outcome.failed.push((id, err)),
                }
            }
        }

        tracing::info!(
            "Delete for {}: {} trashed, {} destroyed, {} failed",
            owner,
            outcome.trashed.len(),
            outcome.destroyed.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    // Drafts

    /// Save a new draft in the owner's Drafts folder
    pub async fn save_draft(&self, owner: &str, content: DraftContent) -> WebmailResult<MessageId> {
        self.ensure_system_folders(owner).await?;

        let draft = Message::new_draft(owner, content);
        self.messages.save_message(&draft).await?;

        tracing::debug!("Saved draft {} for {}", draft.id, owner);
        Ok(draft.id)
    }

    /// Replace the content of an existing draft
    pub async fn update_draft(
        &self,
        owner: &str,
        id: MessageId,
        content: DraftContent,
    ) -> WebmailResult<()> {
        let mut draft = self.owned_draft(owner, id).await?;
        draft.apply_draft(content);
        self.messages.update_message(&draft).await
    }

    async fn owned_draft(&self, owner: &str, id: MessageId) -> WebmailResult<Message> {
        let message = self.owned_message(owner, id).await?;
        // A discarded draft keeps its marker but no longer lives in Drafts
        if !message.is_draft() || !message.is_in(SystemFolder::Drafts) {
            return Err(WebmailError::not_found(format!("Draft {}", id)));
        }
        Ok(message)
    }

    /// Send a draft: the draft record is removed, then its content is sent
    ///
    /// Nothing is rolled back: if the send fails after the draft was removed,
    /// the draft is gone.
    pub async fn send_draft(&self, owner: &str, id: MessageId) -> WebmailResult<MessageId> {
        let draft = self.owned_draft(owner, id).await?;

        let mail = OutgoingMail::new(owner, draft.recipient, draft.subject, draft.body);
        mail.validate()?;

        self.messages.delete_message(id).await?;
        tracing::debug!("Removed draft {} before sending", id);

        self.send_email(&mail).await
    }

    // Sending

    /// Send a message and keep a copy in the sender's Sent folder
    pub async fn send_email(&self, mail: &OutgoingMail) -> WebmailResult<MessageId> {
        mail.validate()?;

        self.transfer.send(mail).await?;

        self.ensure_system_folders(&mail.from).await?;
        let sent = mail.to_sent_message();
        self.messages.save_message(&sent).await?;

        tracing::info!("Sent message {} from {} to {}", sent.id, mail.from, mail.to);
        Ok(sent.id)
    }

    /// Forward one of the owner's messages to each recipient in order
    pub async fn forward(
        &self,
        owner: &str,
        to: &[String],
        id: MessageId,
    ) -> WebmailResult<Vec<MessageId>> {
        let original = self.owned_message(owner, id).await?;
        let mails = compose::forward(owner, to, &original);
        self.fan_out(&mails).await
    }

    /// Reply to one of the owner's messages
    pub async fn reply(
        &self,
        owner: &str,
        to: &str,
        id: MessageId,
        reply_text: &str,
    ) -> WebmailResult<MessageId> {
        let original = self.owned_message(owner, id).await?;
        let mail = compose::reply(owner, to, &original, reply_text);
        self.send_email(&mail).await
    }

    async fn fan_out(&self, mails: &[OutgoingMail]) -> WebmailResult<Vec<MessageId>> {
        let mut sent = Vec::with_capacity(mails.len());
        let mut failed = Vec::new();

        for mail in mails {
            match self.send_email(mail).await {
                Ok(id) => sent.push(id),
                Err(err) => match self.fan_out {
                    FanOutPolicy::FailFast => return Err(err),
                    FanOutPolicy::BestEffort => {
                        tracing::warn!("Delivery to {} failed: {}", mail.to, err);
                        failed.push(mail.to.clone());
                    }
                },
            }
        }

        if failed.is_empty() {
            Ok(sent)
        } else {
            Err(WebmailError::PartialDelivery { failed })
        }
    }

    // Fetching

    /// Pull new mail for the owner into their Inbox; returns how many arrived
    ///
    /// The transfer is told to release the fetched mail only after every
    /// message is stored; a failed save leaves it on the server.
    pub async fn fetch_emails(&self, owner: &str) -> WebmailResult<usize> {
        self.ensure_system_folders(owner).await?;

        let fetched = self.transfer.fetch(owner).await?;
        let count = fetched.len();

        for mut message in fetched {
            message.owner = owner.to_string();
            message.folder = SystemFolder::Inbox.name().to_string();
            message.draft = false;
            self.messages.save_message(&message).await?;
        }

        self.transfer.confirm_fetch(owner).await?;

        tracing::info!("Fetched {} messages for {}", count, owner);
        Ok(count)
    }
}

/// Sort by sent timestamp descending; among equal timestamps the most
/// recently stored message comes first
fn newest_first(mut messages: Vec<Message>) -> Vec<Message> {
    messages.reverse();
    messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
    messages
}

fn views_for(messages: Vec<Message>, viewer: &str) -> Vec<MessageView> {
    messages
        .iter()
        .map(|message| MessageView::for_viewer(message, viewer))
        .collect()
}
