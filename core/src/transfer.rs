//! Mail transfer: SMTP sending and POP3 retrieval

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use webmail_pop3::Pop3Client;

use crate::config::{Pop3Config, SmtpConfig};
use crate::error::{WebmailError, WebmailResult};
use crate::folder::SystemFolder;
use crate::message::{Message, OutgoingMail};

/// The collaborator that actually moves mail on the wire
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransfer: Send + Sync {
    /// Hand one message to the outgoing relay
    async fn send(&self, mail: &OutgoingMail) -> WebmailResult<()>;

    /// Pull new inbound messages for `owner`
    ///
    /// Returned messages are owned by `owner` and placed in Inbox; the
    /// caller persists them. Nothing is removed from the maildrop until
    /// [`MailTransfer::confirm_fetch`] is called.
    async fn fetch(&self, owner: &str) -> WebmailResult<Vec<Message>>;

    /// Release the messages of the last fetch once they are stored
    async fn confirm_fetch(&self, owner: &str) -> WebmailResult<()>;
}

/// Transfer over an SMTP relay and a POP3 maildrop
pub struct SmtpPop3Transfer {
    smtp: Option<AsyncSmtpTransport<Tokio1Executor>>,
    pop3: Pop3Config,
    /// Open session whose retrieved messages await deletion
    pending: Mutex<Option<PendingDeletion>>,
}

/// A POP3 session kept open until the fetched messages are stored
///
/// Dropping it closes the connection without `QUIT`, so the server keeps
/// every message.
struct PendingDeletion {
    client: Pop3Client,
    count: u32,
}

impl SmtpPop3Transfer {
    /// Build the transfer from configuration
    ///
    /// No connection is opened here; an empty SMTP host leaves sending
    /// disabled.
    pub fn new(smtp_config: &SmtpConfig, pop3_config: &Pop3Config) -> WebmailResult<Self> {
        let smtp = if smtp_config.is_configured() {
            Some(Self::build_smtp(smtp_config)?)
        } else {
            tracing::warn!("SMTP host not configured, sending is disabled");
            None
        };

        Ok(Self {
            smtp,
            pop3: pop3_config.clone(),
            pending: Mutex::new(None),
        })
    }

    fn build_smtp(config: &SmtpConfig) -> WebmailResult<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    /// Check whether sending is enabled
    pub fn can_send(&self) -> bool {
        self.smtp.is_some()
    }

    async fn retrieve(&self, owner: &str) -> anyhow::Result<(Pop3Client, Vec<Vec<u8>>)> {
        let username = self.pop3.username.as_deref().unwrap_or(owner);
        let password = self
            .pop3
            .password
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("POP3 password not configured"))?;

        let mut client = Pop3Client::new();
        client.connect(&self.pop3.host, self.pop3.port, self.pop3.tls).await?;
        client.authenticate(username, password).await?;

        let count = client.get_message_count().await?;
        tracing::debug!("POP3 maildrop for {} holds {} messages", owner, count);

        let mut raw_messages = Vec::with_capacity(count as usize);
        for message_num in 1..=count {
            raw_messages.push(client.retrieve_message(message_num).await?);
        }

        Ok((client, raw_messages))
    }

    async fn delete_retrieved(pending: &mut PendingDeletion) -> anyhow::Result<()> {
        for message_num in 1..=pending.count {
            pending.client.delete_message(message_num).await?;
        }
        pending.client.quit().await
    }
}

fn pop3_failure(err: anyhow::Error) -> WebmailError {
    WebmailError::transport(format!("{:#}", err))
}

#[async_trait]
impl MailTransfer for SmtpPop3Transfer {
    async fn send(&self, mail: &OutgoingMail) -> WebmailResult<()> {
        let transport = self
            .smtp
            .as_ref()
            .ok_or_else(|| WebmailError::transport("SMTP is not configured"))?;

        let email = LettreMessage::builder()
            .from(mail.from.parse()?)
            .to(mail.to.parse()?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())?;

        transport.send(email).await?;
        tracing::debug!("Relayed message from {} to {}", mail.from, mail.to);
        Ok(())
    }

    async fn fetch(&self, owner: &str) -> WebmailResult<Vec<Message>> {
        if !self.pop3.is_configured() {
            return Err(WebmailError::transport("POP3 is not configured"));
        }

        // An unconfirmed earlier session closes without deleting anything
        if self.pending.lock().await.take().is_some() {
            tracing::warn!("Dropping unconfirmed POP3 session for {}", owner);
        }

        let (mut client, raw_messages) = self.retrieve(owner).await.map_err(pop3_failure)?;

        // A parse failure drops the session before any DELE is sent
        let messages = raw_messages
            .iter()
            .map(|raw| parse_fetched(owner, raw))
            .collect::<WebmailResult<Vec<_>>>()?;

        if self.pop3.delete_after_fetch && !messages.is_empty() {
            *self.pending.lock().await = Some(PendingDeletion {
                client,
                count: raw_messages.len() as u32,
            });
        } else {
            client.quit().await.map_err(pop3_failure)?;
        }

        Ok(messages)
    }

    async fn confirm_fetch(&self, owner: &str) -> WebmailResult<()> {
        let pending = self.pending.lock().await.take();
        let mut pending = match pending {
            Some(pending) => pending,
            None => return Ok(()),
        };

        Self::delete_retrieved(&mut pending)
            .await
            .map_err(pop3_failure)?;

        tracing::debug!(
            "Removed {} fetched messages for {} from the maildrop",
            pending.count,
            owner
        );
        Ok(())
    }
}

/// Turn a raw RFC 5322 message into an Inbox message for `owner`
pub fn parse_fetched(owner: &str, raw: &[u8]) -> WebmailResult<Message> {
    let parsed = mailparse::parse_mail(raw)?;

    let header = |name: &str| parsed.headers.get_first_value(name).unwrap_or_default();
    let sender = first_address(&header("From"));
    let recipient = match first_address(&header("To")) {
        to if to.is_empty() => owner.to_string(),
        to => to,
    };

    let mut message = Message::new(
        owner,
        sender,
        recipient,
        header("Subject"),
        extract_body(&parsed),
        SystemFolder::Inbox.name(),
    );

    if let Some(sent_at) = parsed
        .headers
        .get_first_value("Date")
        .and_then(|date| mailparse::dateparse(&date).ok())
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    {
        message.sent_at = sent_at;
    }

    Ok(message)
}

/// Bare address of the first mailbox in an address header
fn first_address(value: &str) -> String {
    let parsed = match mailparse::addrparse(value) {
        Ok(list) => list,
        Err(_) => return value.trim().to_string(),
    };

    let first = parsed.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some(info.addr.clone()),
        MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
    });

    first.unwrap_or_else(|| value.trim().to_string())
}

/// Plain-text body, falling back to HTML and then the top-level body
fn extract_body(parsed: &ParsedMail) -> String {
    find_body_part(parsed, "text/plain")
        .or_else(|| find_body_part(parsed, "text/html"))
        .unwrap_or_else(|| parsed.get_body().unwrap_or_default())
}

fn find_body_part(parsed: &ParsedMail, mime_type: &str) -> Option<String> {
    if parsed.subparts.is_empty() {
        if parsed.ctype.mimetype.eq_ignore_ascii_case(mime_type) {
            return parsed.get_body().ok();
        }
        return None;
    }

    parsed
        .subparts
        .iter()
        .find_map(|part| find_body_part(part, mime_type))
}
