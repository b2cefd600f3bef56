//! SQLite storage backend

use crate::error::{WebmailError, WebmailResult};
use crate::folder::{Folder, SystemFolder};
use crate::message::{Message, MessageId};
use crate::store::{FolderRegistry, MessageStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqliteResult, Row};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str =
    "id, owner, sender, recipient, subject, body, sent_at, read, folder, draft";

/// Database connection wrapper
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file
    pub async fn new(database_path: PathBuf) -> WebmailResult<Self> {
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|_| WebmailError::DataDirCreateFailed(parent.to_path_buf()))?;
        }

        tracing::debug!("Opening database at {}", database_path.display());
        let connection = Connection::open(database_path)?;

        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        connection.pragma_update(None, "temp_store", "MEMORY")?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Initialize the database (run migrations)
    pub async fn initialize(&self) -> WebmailResult<()> {
        let migration_manager =
            crate::storage::migrations::MigrationManager::new(self.connection.clone());
        migration_manager.run_migrations().await
    }

    fn row_to_message(row: &Row) -> SqliteResult<Message> {
        let id: String = row.get(0)?;
        let sent_at: i64 = row.get(6)?;

        Ok(Message {
            id: MessageId(Uuid::parse_str(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            owner: row.get(1)?,
            sender: row.get(2)?,
            recipient: row.get(3)?,
            subject: row.get(4)?,
            body: row.get(5)?,
            sent_at: from_millis(6, sent_at)?,
            read: row.get(7)?,
            folder: row.get(8)?,
            draft: row.get(9)?,
        })
    }

    fn row_to_folder(row: &Row) -> SqliteResult<Folder> {
        let created_at: i64 = row.get(3)?;
        Ok(Folder {
            owner: row.get(0)?,
            name: row.get(1)?,
            system: row.get(2)?,
            created_at: from_millis(3, created_at)?,
        })
    }

    async fn query_messages(&self, sql: &str, args: &[&str]) -> WebmailResult<Vec<Message>> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let mut stmt = conn.prepare(sql)?;
        let messages = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), Self::row_to_message)?
            .collect::<SqliteResult<Vec<Message>>>()?;

        Ok(messages)
    }
}

/// Timestamps are stored as unix milliseconds
fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(column: usize, millis: i64) -> SqliteResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            Box::new(e),
        )
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl MessageStore for Database {
    async fn get_message(&self, id: MessageId) -> WebmailResult<Option<Message>> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let message = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS),
                [id.to_string()],
                Self::row_to_message,
            )
            .optional()?;

        Ok(message)
    }

    async fn get_messages_in_folder(
        &self,
        owner: &str,
        folder: &str,
    ) -> WebmailResult<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE owner = ? AND folder = ? ORDER BY rowid",
            MESSAGE_COLUMNS
        );
        self.query_messages(&sql, &[owner, folder]).await
    }

    async fn get_messages_by_sender(&self, sender: &str) -> WebmailResult<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE sender = ? ORDER BY rowid",
            MESSAGE_COLUMNS
        );
        self.query_messages(&sql, &[sender]).await
    }

    async fn save_message(&self, message: &Message) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        conn.execute(
            &format!(
                "INSERT INTO messages ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                MESSAGE_COLUMNS
            ),
            params![
                message.id.to_string(),
                message.owner,
                message.sender,
                message.recipient,
                message.subject,
                message.body,
                to_millis(message.sent_at),
                message.read,
                message.folder,
                message.draft,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                WebmailError::store(format!("Message {} already exists", message.id))
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    async fn update_message(&self, message: &Message) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let changes = conn.execute(
            "UPDATE messages SET owner = ?, sender = ?, recipient = ?, subject = ?, body = ?,
             sent_at = ?, read = ?, folder = ?, draft = ?
             WHERE id = ?",
            params![
                message.owner,
                message.sender,
                message.recipient,
                message.subject,
                message.body,
                to_millis(message.sent_at),
                message.read,
                message.folder,
                message.draft,
                message.id.to_string(),
            ],
        )?;

        if changes == 0 {
            return Err(WebmailError::not_found(format!("Message {}", message.id)));
        }
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let changes = conn.execute("DELETE FROM messages WHERE id = ?", [id.to_string()])?;
        if changes == 0 {
            return Err(WebmailError::not_found(format!("Message {}", id)));
        }
        Ok(())
    }

    async fn delete_if_in_folder(&self, id: MessageId, folder: &str) -> WebmailResult<bool> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let changes = conn.execute(
            "DELETE FROM messages WHERE id = ? AND folder = ?",
            params![id.to_string(), folder],
        )?;
        Ok(changes > 0)
    }

    async fn set_status(&self, id: MessageId, read: bool) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let changes = conn.execute(
            "UPDATE messages SET read = ? WHERE id = ?",
            params![read, id.to_string()],
        )?;
        if changes == 0 {
            return Err(WebmailError::not_found(format!("Message {}", id)));
        }
        Ok(())
    }

    async fn move_to_folder(&self, id: MessageId, owner: &str, folder: &str) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let changes = conn.execute(
            "UPDATE messages SET folder = ? WHERE id = ? AND owner = ?",
            params![folder, id.to_string(), owner],
        )?;
        if changes == 0 {
            return Err(WebmailError::not_found(format!("Message {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl FolderRegistry for Database {
    async fn list_folders(&self, owner: &str) -> WebmailResult<Vec<Folder>> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let mut stmt = conn.prepare(
            "SELECT owner, name, system, created_at FROM folders WHERE owner = ? ORDER BY id",
        )?;
        let folders = stmt
            .query_map([owner], Self::row_to_folder)?
            .collect::<SqliteResult<Vec<Folder>>>()?;

        Ok(folders)
    }

    async fn create_folder(&self, owner: &str, name: &str, system: bool) -> WebmailResult<()> {
        if system && SystemFolder::from_name(name).is_none() {
            return Err(WebmailError::validation(format!("{} is not a system folder", name)));
        }

        let connection = self.connection.clone();
        let conn = connection.lock().await;

        if system {
            let existing: Option<bool> = conn
                .query_row(
                    "SELECT system FROM folders WHERE owner = ? AND name = ?",
                    [owner, name],
                    |row| row.get(0),
                )
                .optional()?;
            if existing == Some(true) {
                return Ok(());
            }
        }

        conn.execute(
            "INSERT INTO folders (owner, name, system, created_at) VALUES (?, ?, ?, ?)",
            params![owner, name, system, to_millis(OffsetDateTime::now_utc())],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                WebmailError::duplicate_folder(name)
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    async fn delete_folder(&self, owner: &str, name: &str) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let changes = conn.execute(
            "DELETE FROM folders WHERE owner = ? AND name = ?",
            [owner, name],
        )?;
        if changes == 0 {
            return Err(WebmailError::not_found(format!("Folder {}", name)));
        }
        Ok(())
    }

    async fn rename_folder(&self, owner: &str, old: &str, new: &str) -> WebmailResult<()> {
        let connection = self.connection.clone();
        let mut conn = connection.lock().await;
        let tx = conn.transaction()?;

        let changes = tx
            .execute(
                "UPDATE folders SET name = ? WHERE owner = ? AND name = ?",
                [new, owner, old],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    WebmailError::duplicate_folder(new)
                } else {
                    e.into()
                }
            })?;
        if changes == 0 {
            return Err(WebmailError::not_found(format!("Folder {}", old)));
        }

        tx.execute(
            "UPDATE messages SET folder = ? WHERE owner = ? AND folder = ?",
            [new, owner, old],
        )?;
        tx.commit()?;

        Ok(())
    }

    async fn folder_exists(&self, owner: &str, name: &str) -> WebmailResult<bool> {
        let connection = self.connection.clone();
        let conn = connection.lock().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM folders WHERE owner = ? AND name = ?",
            [owner, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open(temp_dir: &TempDir) -> Database {
        let database = Database::new(temp_dir.path().join("data").join("test.db"))
            .await
            .unwrap();
        database.initialize().await.unwrap();
        database
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let database = open(&temp_dir).await;
        // Re-running migrations is harmless
        database.initialize().await.unwrap();
        assert!(temp_dir.path().join("data").join("test.db").exists());
    }

    #[tokio::test]
    async fn test_message_operations() {
        let temp_dir = TempDir::new().unwrap();
        let database = open(&temp_dir).await;

        let message = Message::new(
            "bob@test.com",
            "alice@test.com",
            "bob@test.com",
            "Lunch",
            "Noon?",
            "Inbox",
        );
        database.save_message(&message).await.unwrap();
        assert!(database.save_message(&message).await.unwrap_err().is_store_failure());

        let stored = database.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.sender, "alice@test.com");
        assert_eq!(stored.subject, "Lunch");
        assert_eq!(to_millis(stored.sent_at), to_millis(message.sent_at));
        assert!(!stored.read);

        database.set_status(message.id, true).await.unwrap();
        let mut stored = database.get_message(message.id).await.unwrap().unwrap();
        assert!(stored.read);

        stored.body = "1pm?".to_string();
        database.update_message(&stored).await.unwrap();
        assert_eq!(
            database.get_message(message.id).await.unwrap().unwrap().body,
            "1pm?"
        );

        let sent = database.get_messages_by_sender("alice@test.com").await.unwrap();
        assert_eq!(sent.len(), 1);

        database.delete_message(message.id).await.unwrap();
        assert!(database.get_message(message.id).await.unwrap().is_none());
        assert!(database.delete_message(message.id).await.unwrap_err().is_not_found());
        assert!(database.set_status(message.id, false).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_out_of_range_timestamp_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let database = open(&temp_dir).await;

        let message = Message::new("bob@test.com", "a@test.com", "bob@test.com", "s", "b", "Inbox");
        database.save_message(&message).await.unwrap();

        database
            .connection
            .lock()
            .await
            .execute(
                "UPDATE messages SET sent_at = ?1 WHERE id = ?2",
                rusqlite::params![i64::MAX, message.id.to_string()],
            )
            .unwrap();

        let err = database.get_message(message.id).await.unwrap_err();
        assert!(matches!(
            err,
            WebmailError::Database(rusqlite::Error::FromSqlConversionFailure(6, _, _))
        ));
    }

    #[tokio::test]
    async fn test_move_and_conditional_delete() {
        let temp_dir = TempDir::new().unwrap();
        let database = open(&temp_dir).await;

        let message = Message::new("bob@test.com", "a@test.com", "bob@test.com", "s", "b", "Inbox");
        database.save_message(&message).await.unwrap();

        assert!(database
            .move_to_folder(message.id, "eve@test.com", "Trash")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(!database.delete_if_in_folder(message.id, "Trash").await.unwrap());

        database.move_to_folder(message.id, "bob@test.com", "Trash").await.unwrap();
        assert_eq!(
            database.get_messages_in_folder("bob@test.com", "Trash").await.unwrap().len(),
            1
        );
        assert!(database.delete_if_in_folder(message.id, "Trash").await.unwrap());
        assert!(database.get_message(message.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_folder_operations() {
        let temp_dir = TempDir::new().unwrap();
        let database = open(&temp_dir).await;
        let owner = "alice@test.com";

        database.create_folder(owner, "Inbox", true).await.unwrap();
        database.create_folder(owner, "Inbox", true).await.unwrap();
        database.create_folder(owner, "Work", false).await.unwrap();
        database.create_folder(owner, "Home", false).await.unwrap();

        let err = database.create_folder(owner, "Work", false).await.unwrap_err();
        assert!(matches!(err, WebmailError::DuplicateFolder(_)));

        let names: Vec<String> = database
            .list_folders(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Inbox", "Work", "Home"]);

        let mut message = Message::new(owner, "x@test.com", owner, "s", "b", "Work");
        database.save_message(&message).await.unwrap();

        let err = database.rename_folder(owner, "Work", "Home").await.unwrap_err();
        assert!(matches!(err, WebmailError::DuplicateFolder(_)));

        database.rename_folder(owner, "Work", "Jobs").await.unwrap();
        message = database.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(message.folder, "Jobs");
        assert!(!database.folder_exists(owner, "Work").await.unwrap());

        let err = database.rename_folder(owner, "Missing", "Other").await.unwrap_err();
        assert!(err.is_not_found());

        database.delete_folder(owner, "Jobs").await.unwrap();
        assert!(!database.folder_exists(owner, "Jobs").await.unwrap());
        assert!(database.delete_folder(owner, "Jobs").await.unwrap_err().is_not_found());
    }
}
