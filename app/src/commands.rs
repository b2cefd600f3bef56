//! Subcommands and their output

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::io::Write;
use std::path::Path;
use webmail_core::compose::format_date;
use webmail_core::{Config, DraftContent, MailboxEngine, MessageId, MessageView, OutgoingMail};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List folders, creating the system folders on first use
    Folders,
    /// Create a custom folder
    CreateFolder { name: String },
    /// Rename a custom folder
    RenameFolder { old: String, new: String },
    /// Delete a custom folder; its messages go to Trash
    DeleteFolder { name: String },
    /// List messages in a folder (Inbox by default), newest first
    List {
        folder: Option<String>,
        /// List everything the owner sent, across folders
        #[arg(long, conflicts_with = "folder")]
        outgoing: bool,
    },
    /// Show one message
    Show { id: String },
    /// Move a message to another folder
    Move { id: String, folder: String },
    /// Mark a message read (or unread)
    Mark {
        id: String,
        #[arg(long)]
        unread: bool,
    },
    /// Move messages to Trash, or destroy them if already there
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Folder the messages were listed from
        #[arg(long, default_value = "Inbox")]
        folder: String,
    },
    /// Send a message
    Send {
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Save a new draft, or update one with --id
    SaveDraft {
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "")]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Send a draft
    SendDraft { id: String },
    /// Forward a message to one or more recipients
    Forward {
        id: String,
        #[arg(long, required = true)]
        to: Vec<String>,
    },
    /// Reply to a message
    Reply {
        id: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        text: String,
    },
    /// Fetch new mail into the Inbox
    Fetch,
    /// Write the current configuration to the config file
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

fn parse_id(id: &str) -> Result<MessageId> {
    Ok(MessageId::parse(id)?)
}

fn write_views<W: Write>(views: &[MessageView], json: bool, out: &mut W) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(views)?)?;
        return Ok(());
    }

    for view in views {
        let marker = if view.read { ' ' } else { '*' };
        let arrow = if view.is_outgoing() { "to" } else { "from" };
        writeln!(
            out,
            "{} {}  {} {:<30}  {}  {}",
            marker,
            view.id,
            arrow,
            view.counterpart,
            format_date(view.sent_at),
            view.subject
        )?;
    }
    Ok(())
}

fn write_view<W: Write>(view: &MessageView, json: bool, out: &mut W) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(view)?)?;
        return Ok(());
    }

    writeln!(out, "From: {}", view.sender)?;
    writeln!(out, "To: {}", view.recipient)?;
    writeln!(out, "Date: {}", format_date(view.sent_at))?;
    writeln!(out, "Subject: {}", view.subject)?;
    writeln!(out, "Folder: {}", view.folder)?;
    writeln!(out)?;
    writeln!(out, "{}", view.body)?;
    Ok(())
}

/// Write the configuration file
pub fn init_config<W: Write>(config: &Config, path: &Path, force: bool, out: &mut W) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    config.save(path)?;
    writeln!(out, "Wrote {}", path.display())?;
    Ok(())
}

/// Run a mailbox command for `owner`
pub async fn run<W: Write>(
    engine: &MailboxEngine,
    owner: &str,
    command: Command,
    json: bool,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Folders => {
            for folder in engine.get_folders(owner).await? {
                let kind = if folder.is_system() { "system" } else { "custom" };
                writeln!(out, "{:<24} {}", folder.name(), kind)?;
            }
        }
        Command::CreateFolder { name } => {
            engine.create_folder(owner, &name).await?;
            writeln!(out, "Created {}", name)?;
        }
        Command::RenameFolder { old, new } => {
            engine.rename_folder(owner, &old, &new).await?;
            writeln!(out, "Renamed {} to {}", old, new)?;
        }
        Command::DeleteFolder { name } => {
            engine.delete_folder(owner, &name).await?;
            writeln!(out, "Deleted {}", name)?;
        }
        Command::List { folder, outgoing } => {
            let views = if outgoing {
                engine.get_outgoing(owner).await?
            } else {
                match folder {
                    Some(folder) => engine.get_folder_emails(owner, &folder).await?,
                    None => engine.inbox(owner).await?,
                }
            };
            write_views(&views, json, out)?;
        }
        Command::Show { id } => {
            let view = engine.get_email(owner, parse_id(&id)?).await?;
            write_view(&view, json, out)?;
        }
        Command::Move { id, folder } => {
            engine
                .change_email_folder(parse_id(&id)?, owner, &folder)
                .await?;
            writeln!(out, "Moved {} to {}", id, folder)?;
        }
        Command::Mark { id, unread } => {
            let id = parse_id(&id)?;
            // Ownership check before the status change
            engine.get_email(owner, id).await?;
            engine.change_status(id, !unread).await?;
            writeln!(out, "Marked {} {}", id, if unread { "unread" } else { "read" })?;
        }
        Command::Delete { ids, folder } => {
            let ids = ids
                .iter()
                .map(|id| parse_id(id))
                .collect::<Result<Vec<_>>>()?;

            let outcome = engine.delete_emails(owner, &ids, &folder).await?;
            for id in &outcome.trashed {
                writeln!(out, "Trashed {}", id)?;
            }
            for id in &outcome.destroyed {
                writeln!(out, "Destroyed {}", id)?;
            }
            for (id, err) in &outcome.failed {
                writeln!(out, "Failed {}: {}", id, err)?;
            }
            outcome.into_result()?;
        }
        Command::Send { to, subject, body } => {
            let mail = OutgoingMail::new(owner, to, subject, body);
            let id = engine.send_email(&mail).await?;
            writeln!(out, "Sent {}", id)?;
        }
        Command::SaveDraft {
            id,
            to,
            subject,
            body,
        } => {
            let content = DraftContent {
                recipient: to,
                subject,
                body,
            };
            match id {
                Some(id) => {
                    let id = parse_id(&id)?;
                    engine.update_draft(owner, id, content).await?;
                    writeln!(out, "Updated draft {}", id)?;
                }
                None => {
                    let id = engine.save_draft(owner, content).await?;
                    writeln!(out, "Saved draft {}", id)?;
                }
            }
        }
        Command::SendDraft { id } => {
            let sent = engine.send_draft(owner, parse_id(&id)?).await?;
            writeln!(out, "Sent {}", sent)?;
        }
        Command::Forward { id, to } => {
            let sent = engine.forward(owner, &to, parse_id(&id)?).await?;
            writeln!(out, "Forwarded to {} recipients", sent.len())?;
        }
        Command::Reply { id, to, text } => {
            let sent = engine.reply(owner, &to, parse_id(&id)?, &text).await?;
            writeln!(out, "Sent {}", sent)?;
        }
        Command::Fetch => {
            let count = engine
                .fetch_emails(owner)
                .await
                .context("Fetching mail failed")?;
            writeln!(out, "Fetched {} messages", count)?;
        }
        Command::InitConfig { .. } => bail!("init-config does not act on a mailbox"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use webmail_core::config::StorageBackend;

    const OWNER: &str = "alice@test.com";

    async fn engine() -> MailboxEngine {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        webmail_core::open_engine(&config).await.unwrap()
    }

    async fn run_to_string(engine: &MailboxEngine, command: Command) -> Result<String> {
        let mut out = Vec::new();
        run(engine, OWNER, command, false, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_folder_commands() {
        let engine = engine().await;

        let output = run_to_string(&engine, Command::Folders).await.unwrap();
        assert!(output.starts_with("Inbox"));
        assert_eq!(output.lines().count(), 5);

        let create = Command::CreateFolder {
            name: "Projects".to_string(),
        };
        run_to_string(&engine, create).await.unwrap();

        let delete = Command::DeleteFolder {
            name: "Trash".to_string(),
        };
        assert!(run_to_string(&engine, delete).await.is_err());

        let output = run_to_string(&engine, Command::Folders).await.unwrap();
        assert!(output.lines().last().unwrap().starts_with("Projects"));
    }

    #[tokio::test]
    async fn test_draft_commands() {
        let engine = engine().await;

        let output = run_to_string(
            &engine,
            Command::SaveDraft {
                id: None,
                to: String::new(),
                subject: "Plan".to_string(),
                body: "v1".to_string(),
            },
        )
        .await
        .unwrap();
        let id = output.trim().trim_start_matches("Saved draft ").to_string();

        let list = Command::List {
            folder: Some("Drafts".to_string()),
            outgoing: false,
        };
        let output = run_to_string(&engine, list).await.unwrap();
        assert!(output.contains(&id));
        assert!(output.contains("Plan"));

        let show = Command::Show { id: id.clone() };
        let output = run_to_string(&engine, show).await.unwrap();
        assert!(output.contains("Subject: Plan"));
        assert!(output.ends_with("v1\n"));

        // Invalid recipient keeps the draft
        let send = Command::SendDraft { id: id.clone() };
        assert!(run_to_string(&engine, send).await.is_err());

        let delete = |folder: &str| Command::Delete {
            ids: vec![id.clone()],
            folder: folder.to_string(),
        };
        run_to_string(&engine, delete("Drafts")).await.unwrap();
        let output = run_to_string(&engine, delete("Trash")).await.unwrap();
        assert!(output.starts_with("Destroyed"));
        assert!(run_to_string(&engine, Command::Show { id }).await.is_err());
    }

    #[tokio::test]
    async fn test_json_listing() {
        let engine = engine().await;
        let mut out = Vec::new();
        let list = Command::List {
            folder: None,
            outgoing: false,
        };
        run(&engine, OWNER, list, true, &mut out).await.unwrap();
        let views: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(views, serde_json::json!([]));
    }

    #[test]
    fn test_init_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let mut out = Vec::new();

        init_config(&Config::default(), &path, false, &mut out).unwrap();
        assert!(path.exists());
        assert!(init_config(&Config::default(), &path, false, &mut out).is_err());
        init_config(&Config::default(), &path, true, &mut out).unwrap();
    }

    #[test]
    fn test_bad_id() {
        assert!(parse_id("not-a-uuid").is_err());
    }
}
