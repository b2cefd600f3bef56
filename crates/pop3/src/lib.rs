//! Minimal async POP3 client for the webmail backend

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;

/// Errors reported by the server itself
#[derive(Debug, thiserror::Error)]
pub enum Pop3Error {
    /// The server answered `-ERR`
    #[error("Server rejected {command}: {message}")]
    Rejected { command: String, message: String },

    /// The server answered with something that is not a POP3 status line
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// A command was issued before `connect`
    #[error("Not connected")]
    NotConnected,
}

trait Pop3Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Pop3Stream for T {}

/// Mailbox size reported by `STAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStat {
    pub count: u32,
    pub size: u64,
}

/// POP3 client
pub struct Pop3Client {
    stream: Option<BufReader<Box<dyn Pop3Stream>>>,
}

impl Pop3Client {
    /// Create a new POP3 client
    pub fn new() -> Self {
        Self { stream: None }
    }

    /// Check whether a session is open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect to a POP3 server and consume its greeting
    pub async fn connect(&mut self, host: &str, port: u16, use_tls: bool) -> Result<()> {
        let tcp_stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

        let stream: Box<dyn Pop3Stream> = if use_tls {
            let tls_connector = TlsConnector::from(native_tls::TlsConnector::new()?);
            Box::new(tls_connector.connect(host, tcp_stream).await?)
        } else {
            Box::new(tcp_stream)
        };

        self.stream = Some(BufReader::new(stream));

        let greeting = self.read_status("greeting").await?;
        tracing::debug!("POP3 greeting from {}: {}", host, greeting);
        Ok(())
    }

    /// Authenticate with username and password
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        self.send_command(&format!("USER {}", username)).await?;
        self.send_command(&format!("PASS {}", password))
            .await
            .context("Authentication failed")?;
        Ok(())
    }

    /// Get message count and total size
    pub async fn stat(&mut self) -> Result<MailboxStat> {
        let response = self.send_command("STAT").await?;
        let mut parts = response.split_whitespace();

        let count = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Pop3Error::Protocol(response.clone()))?;
        let size = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Pop3Error::Protocol(response.clone()))?;

        Ok(MailboxStat { count, size })
    }

    /// Get message count
    pub async fn get_message_count(&mut self) -> Result<u32> {
        Ok(self.stat().await?.count)
    }

    /// Retrieve a message as raw RFC 5322 bytes
    pub async fn retrieve_message(&mut self, message_num: u32) -> Result<Vec<u8>> {
        self.send_command(&format!("RETR {}", message_num)).await?;
        self.read_multiline().await
    }

    /// Mark a message for deletion at `QUIT`
    pub async fn delete_message(&mut self, message_num: u32) -> Result<()> {
        self.send_command(&format!("DELE {}", message_num)).await?;
        Ok(())
    }

    /// Quit the session, committing deletions
    pub async fn quit(&mut self) -> Result<()> {
        self.send_command("QUIT").await?;
        self.stream = None;
        Ok(())
    }

    /// Send a command and return the text after `+OK`
    async fn send_command(&mut self, command: &str) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(Pop3Error::NotConnected)?;
        stream.write_all(format!("{}\r\n", command).as_bytes()).await?;
        stream.flush().await?;

        let verb = command.split_whitespace().next().unwrap_or(command);
        self.read_status(verb).await
    }

    async fn read_status(&mut self, command: &str) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(Pop3Error::NotConnected)?;

        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Err(Pop3Error::Protocol("connection closed".to_string()).into());
        }
        let line = line.trim_end();

        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim_start().to_string())
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Err(Pop3Error::Rejected {
                command: command.to_string(),
                message: rest.trim_start().to_string(),
            }
            .into())
        } else {
            Err(Pop3Error::Protocol(line.to_string()).into())
        }
    }

    /// Read a dot-terminated response body, undoing byte-stuffing
    async fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(Pop3Error::NotConnected)?;
        let mut body = Vec::new();

        loop {
            let mut line = Vec::new();
            if stream.read_until(b'\n', &mut line).await? == 0 {
                return Err(Pop3Error::Protocol("connection closed mid-message".to_string()).into());
            }

            if line == b".\r\n" || line == b".\n" {
                break;
            }

            let content = if line.starts_with(b"..") { &line[1..] } else { &line[..] };
            body.extend_from_slice(content);
        }

        Ok(body)
    }
}

impl Default for Pop3Client {
    fn default() -> Self {
        Self::new()
    }
}
