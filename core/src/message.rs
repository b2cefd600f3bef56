//! Message model for the webmail core

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{WebmailError, WebmailResult};
use crate::folder::SystemFolder;

/// Opaque message identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its string form
    pub fn parse(s: &str) -> WebmailResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| WebmailError::validation(format!("Invalid message id: {}", s)))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored email
///
/// The record is neutral: `sender` and `recipient` are never swapped.
/// Use [`MessageView::for_viewer`] to orient it for a particular mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Mailbox this copy belongs to
    pub owner: String,
    /// Sender address
    pub sender: String,
    /// Recipient address (may be empty on drafts)
    pub recipient: String,
    /// Subject
    pub subject: String,
    /// Plain-text body
    pub body: String,
    /// Sent timestamp (last edit time for drafts)
    pub sent_at: OffsetDateTime,
    /// Read flag
    pub read: bool,
    /// Owning folder name
    pub folder: String,
    /// Draft marker
    pub draft: bool,
}

impl Message {
    /// Create a new message placed in `folder`
    pub fn new(
        owner: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            owner: owner.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            sent_at: OffsetDateTime::now_utc(),
            read: false,
            folder: folder.into(),
            draft: false,
        }
    }

    /// Create a new draft in the owner's Drafts folder
    pub fn new_draft(owner: impl Into<String>, content: DraftContent) -> Self {
        let owner = owner.into();
        let mut message = Self::new(
            owner.clone(),
            owner,
            content.recipient,
            content.subject,
            content.body,
            SystemFolder::Drafts.name(),
        );
        message.draft = true;
        message.read = true;
        message
    }

    /// Get the message ID
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Check whether this copy belongs to `owner`
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Check whether the message sits in the given system folder
    pub fn is_in(&self, folder: SystemFolder) -> bool {
        self.folder == folder.name()
    }

    /// Check if the message is a draft
    pub fn is_draft(&self) -> bool {
        self.draft
    }

    /// Check if the message is read
    pub fn is_read(&self) -> bool {
        self.read
    }

    /// Replace draft content in place
    pub fn apply_draft(&mut self, content: DraftContent) {
        self.recipient = content.recipient;
        self.subject = content.subject;
        self.body = content.body;
        self.sent_at = OffsetDateTime::now_utc();
    }

    /// The editable content of this message
    pub fn content(&self) -> DraftContent {
        DraftContent {
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }
}

/// Editable fields of a draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftContent {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Which side of a message the viewer is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The viewer sent the message
    Outgoing,
    /// The viewer received the message
    Incoming,
}

/// A message oriented for one viewer
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub direction: Direction,
    /// The other party: recipient for outgoing, sender for incoming
    pub counterpart: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sent_at: OffsetDateTime,
    pub read: bool,
    pub folder: String,
    pub draft: bool,
}

impl MessageView {
    /// Orient a stored message for `viewer`
    pub fn for_viewer(message: &Message, viewer: &str) -> Self {
        let direction = if message.sender == viewer {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };

        let counterpart = match direction {
            Direction::Outgoing => message.recipient.clone(),
            Direction::Incoming => message.sender.clone(),
        };

        Self {
            id: message.id,
            direction,
            counterpart,
            sender: message.sender.clone(),
            recipient: message.recipient.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            sent_at: message.sent_at,
            read: message.read,
            folder: message.folder.clone(),
            draft: message.draft,
        }
    }

    /// Check if the viewer sent this message
    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }
}

/// A message handed to the mail transfer collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Validate both addresses
    pub fn validate(&self) -> WebmailResult<()> {
        validate_address(&self.from)?;
        validate_address(&self.to)
    }

    /// The Sent-folder copy kept by the sender once the mail is accepted
    pub fn to_sent_message(&self) -> Message {
        let mut message = Message::new(
            self.from.clone(),
            self.from.clone(),
            self.to.clone(),
            self.subject.clone(),
            self.body.clone(),
            SystemFolder::Sent.name(),
        );
        message.read = true;
        message
    }
}

/// Check that an address is a syntactically valid email address
pub fn validate_address(address: &str) -> WebmailResult<()> {
    if address.trim().is_empty() {
        return Err(WebmailError::validation("Email address cannot be empty"));
    }

    if !email_address::EmailAddress::is_valid(address) {
        return Err(WebmailError::validation(format!(
            "Invalid email address: {}",
            address
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new(
            "bob@test.com",
            "alice@test.com",
            "bob@test.com",
            "Lunch",
            "Noon?",
            SystemFolder::Inbox.name(),
        )
    }

    #[test]
    fn test_message_creation() {
        let message = sample();
        assert!(message.is_owned_by("bob@test.com"));
        assert!(message.is_in(SystemFolder::Inbox));
        assert!(!message.is_read());
        assert!(!message.is_draft());
    }

    #[test]
    fn test_view_orientation() {
        let message = sample();

        let received = MessageView::for_viewer(&message, "bob@test.com");
        assert_eq!(received.direction, Direction::Incoming);
        assert_eq!(received.counterpart, "alice@test.com");

        let sent = MessageView::for_viewer(&message, "alice@test.com");
        assert!(sent.is_outgoing());
        assert_eq!(sent.counterpart, "bob@test.com");

        // The stored record keeps its canonical orientation
        assert_eq!(message.sender, "alice@test.com");
        assert_eq!(message.recipient, "bob@test.com");
    }

    #[test]
    fn test_draft_lifecycle_fields() {
        let mut draft = Message::new_draft(
            "alice@test.com",
            DraftContent {
                recipient: String::new(),
                subject: "Plan".to_string(),
                body: "v1".to_string(),
            },
        );
        let id = draft.id();
        assert!(draft.is_draft());
        assert!(draft.is_in(SystemFolder::Drafts));
        assert_eq!(draft.sender, "alice@test.com");

        draft.apply_draft(DraftContent {
            recipient: "bob@test.com".to_string(),
            subject: "Plan".to_string(),
            body: "v2".to_string(),
        });
        assert_eq!(draft.id(), id);
        assert_eq!(draft.body, "v2");
        assert_eq!(draft.content().recipient, "bob@test.com");
    }

    #[test]
    fn test_sent_copy() {
        let mail = OutgoingMail::new("alice@test.com", "bob@test.com", "Hi", "Hello");
        let sent = mail.to_sent_message();
        assert_eq!(sent.owner, "alice@test.com");
        assert!(sent.is_in(SystemFolder::Sent));
        assert!(sent.is_read());
        assert!(!sent.is_draft());
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address("alice@test.com").is_ok());
        assert!(validate_address("").is_err());
        assert!(validate_address("not-an-address").is_err());

        let mail = OutgoingMail::new("alice@test.com", "nobody", "Hi", "Hello");
        assert!(mail.validate().is_err());
    }

    #[test]
    fn test_message_id_parse() {
        let id = MessageId::new();
        assert_eq!(MessageId::parse(&id.to_string()).unwrap(), id);
        assert!(MessageId::parse("nope").is_err());
    }
}
