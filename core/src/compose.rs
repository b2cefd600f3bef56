//! Forward and reply composition
//!
//! Both functions are total: they only build [`OutgoingMail`] values from an
//! existing message. Sending them is the engine's job.

use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::message::{Message, OutgoingMail};

/// Banner opening the body of every forwarded message
pub const FORWARD_BANNER: &str = "---------- Forwarded message ---------";

/// Prefix applied to each quoted line of a reply
pub const QUOTE_PREFIX: &str = "> ";

/// Format a timestamp for attribution lines and forward headers
///
/// RFC 2822 (`Tue, 01 Jul 2003 10:52:37 +0000`), or RFC 3339 for years RFC
/// 2822 cannot express. Falls back to the unix timestamp if both fail.
pub fn format_date(at: OffsetDateTime) -> String {
    at.format(&Rfc2822)
        .or_else(|_| at.format(&Rfc3339))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Subject of a forwarded message
pub fn forward_subject(subject: &str) -> String {
    format!("Fwd: {}", subject)
}

/// Subject of a reply
pub fn reply_subject(subject: &str) -> String {
    format!("Re: {}", subject)
}

/// Body of a forwarded message
pub fn forward_body(original: &Message) -> String {
    format!(
        "{}\nFrom: {}\nDate: {}\nSubject: {}\nTo: {}\n\n{}",
        FORWARD_BANNER,
        original.sender,
        format_date(original.sent_at),
        original.subject,
        original.recipient,
        original.body,
    )
}

/// Body of a reply: the new text, the attribution line, then the quoted original
pub fn reply_body(original: &Message, reply_text: &str) -> String {
    let quoted = original
        .body
        .lines()
        .map(|line| format!("{}{}", QUOTE_PREFIX, line))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nOn {}, {} wrote:\n{}",
        reply_text,
        format_date(original.sent_at),
        original.sender,
        quoted,
    )
}

/// Compose one forwarded copy per recipient, in recipient order
pub fn forward(from: &str, to: &[String], original: &Message) -> Vec<OutgoingMail> {
    let subject = forward_subject(&original.subject);
    let body = forward_body(original);

    to.iter()
        .map(|recipient| {
            OutgoingMail::new(from, recipient.as_str(), subject.as_str(), body.as_str())
        })
        .collect()
}

/// Compose a reply to a single recipient
pub fn reply(from: &str, to: &str, original: &Message, reply_text: &str) -> OutgoingMail {
    OutgoingMail::new(
        from,
        to,
        reply_subject(&original.subject),
        reply_body(original, reply_text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn original() -> Message {
        let mut message = Message::new(
            "me@test.com",
            "original@test.com",
            "me@test.com",
            "Original Subject",
            "Original Body",
            "Inbox",
        );
        message.sent_at = datetime!(2003-07-01 10:52:37 UTC);
        message
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date(datetime!(2003-07-01 10:52:37 UTC)),
            "Tue, 01 Jul 2003 10:52:37 +0000"
        );
        // Years before 1900 are outside RFC 2822
        assert_eq!(
            format_date(datetime!(1850-01-01 00:00:00 UTC)),
            "1850-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_forward_composition() {
        let recipients = vec!["r1@test.com".to_string(), "r2@test.com".to_string()];
        let mails = forward("sender@test.com", &recipients, &original());

        assert_eq!(mails.len(), 2);
        assert_eq!(mails[0].to, "r1@test.com");
        assert_eq!(mails[1].to, "r2@test.com");

        for mail in &mails {
            assert_eq!(mail.from, "sender@test.com");
            assert_eq!(mail.subject, "Fwd: Original Subject");
            assert!(mail.body.starts_with(FORWARD_BANNER));
            assert!(mail.body.contains("From: original@test.com"));
            assert!(mail.body.contains("Date: Tue, 01 Jul 2003 10:52:37 +0000"));
            assert!(mail.body.contains("Subject: Original Subject"));
            assert!(mail.body.contains("To: me@test.com"));
            assert!(mail.body.ends_with("\n\nOriginal Body"));
        }
    }

    #[test]
    fn test_forward_without_recipients() {
        assert!(forward("sender@test.com", &[], &original()).is_empty());
    }

    #[test]
    fn test_reply_composition() {
        let mail = reply("me@test.com", "r@test.com", &original(), "Thanks!");

        assert_eq!(mail.to, "r@test.com");
        assert_eq!(mail.subject, "Re: Original Subject");
        assert_eq!(
            mail.body,
            "Thanks!\n\n\
             On Tue, 01 Jul 2003 10:52:37 +0000, original@test.com wrote:\n\
             > Original Body"
        );
    }

    #[test]
    fn test_reply_quotes_every_line() {
        let mut message = original();
        message.body = "line one\n\nline three".to_string();

        let body = reply_body(&message, "ok");
        assert!(body.ends_with("> line one\n> \n> line three"));
    }
}
