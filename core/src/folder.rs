//! Folder model for the webmail core

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{WebmailError, WebmailResult};

/// Longest folder name accepted from a user
pub const MAX_FOLDER_NAME_LEN: usize = 64;

/// The five system-reserved folders every mailbox has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemFolder {
    /// Received mail
    Inbox,
    /// Mail sent by the owner
    Sent,
    /// Junk mail
    Spam,
    /// Unsent drafts
    Drafts,
    /// Soft-deleted mail
    Trash,
}

impl SystemFolder {
    /// All system folders in bootstrap order
    pub const ALL: [SystemFolder; 5] = [
        SystemFolder::Inbox,
        SystemFolder::Sent,
        SystemFolder::Spam,
        SystemFolder::Drafts,
        SystemFolder::Trash,
    ];

    /// The literal folder name stored by every backend
    pub fn name(self) -> &'static str {
        match self {
            SystemFolder::Inbox => "Inbox",
            SystemFolder::Sent => "Sent",
            SystemFolder::Spam => "Spam",
            SystemFolder::Drafts => "Drafts",
            SystemFolder::Trash => "Trash",
        }
    }

    /// Look up a system folder by exact name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|folder| folder.name() == name)
    }

    /// Check whether a name is reserved for a system folder
    pub fn is_system_name(name: &str) -> bool {
        Self::from_name(name).is_some()
    }

    fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|folder| *folder == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl std::fmt::Display for SystemFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A named partition of an owner's mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Owner identity (email address)
    pub owner: String,
    /// Folder name, unique per owner
    pub name: String,
    /// System-reserved flag
    pub system: bool,
    /// Creation time
    pub created_at: OffsetDateTime,
}

impl Folder {
    /// Create a system folder record
    pub fn new_system(owner: impl Into<String>, folder: SystemFolder) -> Self {
        Self {
            owner: owner.into(),
            name: folder.name().to_string(),
            system: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Create a user-defined folder record
    pub fn new_custom(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            system: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Get the folder name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the owner
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Check if this is a system folder
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// The system folder this record represents, if any
    pub fn system_kind(&self) -> Option<SystemFolder> {
        if self.system {
            SystemFolder::from_name(&self.name)
        } else {
            None
        }
    }
}

/// Validate a user-supplied folder name
///
/// Names must be non-blank, free of control characters and the `/`
/// separator (folders are flat), and at most [`MAX_FOLDER_NAME_LEN`]
/// characters.
pub fn validate_folder_name(name: &str) -> WebmailResult<()> {
    if name.trim().is_empty() {
        return Err(WebmailError::validation("Folder name cannot be empty"));
    }

    if name.trim() != name {
        return Err(WebmailError::validation(
            "Folder name cannot start or end with whitespace",
        ));
    }

    if name.contains('/') {
        return Err(WebmailError::validation("Nested folders are not supported"));
    }

    if name.chars().any(char::is_control) {
        return Err(WebmailError::validation(
            "Folder name cannot contain control characters",
        ));
    }

    if name.chars().count() > MAX_FOLDER_NAME_LEN {
        return Err(WebmailError::validation(format!(
            "Folder name cannot exceed {} characters",
            MAX_FOLDER_NAME_LEN
        )));
    }

    Ok(())
}

/// Order folders for display: system folders in canonical order, then
/// custom folders in the order the registry returned them.
pub fn display_order(folders: Vec<Folder>) -> Vec<Folder> {
    let (mut system, custom): (Vec<Folder>, Vec<Folder>) =
        folders.into_iter().partition(Folder::is_system);

    system.sort_by_key(|folder| {
        folder
            .system_kind()
            .map(SystemFolder::position)
            .unwrap_or(SystemFolder::ALL.len())
    });

    system.extend(custom);
    system
}
