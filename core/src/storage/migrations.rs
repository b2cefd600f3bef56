//! Database migrations for the SQLite backend

use crate::error::{WebmailError, WebmailResult};
use rusqlite::{Connection, Result as SqliteResult};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Migration manager for database schema updates
pub struct MigrationManager {
    connection: Arc<Mutex<Connection>>,
}

impl MigrationManager {
    /// Create a new migration manager
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> WebmailResult<()> {
        self.create_migrations_table().await?;

        for migration in self.get_migrations() {
            if self.is_migration_applied(migration.name()).await? {
                continue;
            }

            tracing::info!("Applying migration: {}", migration.name());
            let mut conn = self.connection.lock().await;
            let tx = conn.transaction()?;
            migration.apply(&tx).map_err(|e| {
                WebmailError::DatabaseMigration(format!("{}: {}", migration.name(), e))
            })?;
            tx.execute("INSERT INTO migrations (name) VALUES (?)", [migration.name()])?;
            tx.commit()?;
            tracing::debug!("Migration applied: {}", migration.name());
        }

        Ok(())
    }

    /// Names of the migrations already recorded, in application order
    pub async fn applied_migrations(&self) -> WebmailResult<Vec<String>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("SELECT name FROM migrations ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(names)
    }

    async fn create_migrations_table(&self) -> SqliteResult<()> {
        let conn = self.connection.lock().await;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }

    async fn is_migration_applied(&self, migration_name: &str) -> SqliteResult<bool> {
        let conn = self.connection.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM migrations WHERE name = ?",
            [migration_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_migrations(&self) -> Vec<Box<dyn Migration>> {
        vec![
            Box::new(CreateFoldersTable),
            Box::new(CreateMessagesTable),
            Box::new(AddIndexes),
        ]
    }
}

trait Migration {
    fn name(&self) -> &str;
    fn apply(&self, connection: &Connection) -> SqliteResult<()>;
}

/// Folder names are unique per owner
struct CreateFoldersTable;

impl Migration for CreateFoldersTable {
    fn name(&self) -> &str {
        "create_folders_table"
    }

    fn apply(&self, connection: &Connection) -> SqliteResult<()> {
        connection.execute(
            "CREATE TABLE folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                system INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                UNIQUE (owner, name)
            )",
            [],
        )?;
        Ok(())
    }
}

struct CreateMessagesTable;

impl Migration for CreateMessagesTable {
    fn name(&self) -> &str {
        "create_messages_table"
    }

    fn apply(&self, connection: &Connection) -> SqliteResult<()> {
        connection.execute(
            "CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                folder TEXT NOT NULL,
                draft INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        Ok(())
    }
}

struct AddIndexes;

impl Migration for AddIndexes {
    fn name(&self) -> &str {
        "add_indexes"
    }

    fn apply(&self, connection: &Connection) -> SqliteResult<()> {
        connection.execute("CREATE INDEX IF NOT EXISTS idx_folders_owner ON folders (owner)", [])?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_owner_folder ON messages (owner, folder)",
            [],
        )?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages (sender)",
            [],
        )?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages (sent_at)",
            [],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(temp_dir: &TempDir) -> Arc<Mutex<Connection>> {
        let connection = Connection::open(temp_dir.path().join("test.db")).unwrap();
        Arc::new(Mutex::new(connection))
    }

    #[tokio::test]
    async fn test_migration_manager() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationManager::new(open(&temp_dir));

        manager.run_migrations().await.unwrap();

        let applied = manager.applied_migrations().await.unwrap();
        assert_eq!(
            applied,
            vec!["create_folders_table", "create_messages_table", "add_indexes"]
        );
    }

    #[tokio::test]
    async fn test_migration_idempotency() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationManager::new(open(&temp_dir));

        manager.run_migrations().await.unwrap();
        manager.run_migrations().await.unwrap();

        assert_eq!(manager.applied_migrations().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_folder_uniqueness_constraint() {
        let temp_dir = TempDir::new().unwrap();
        let connection = open(&temp_dir);
        MigrationManager::new(connection.clone())
            .run_migrations()
            .await
            .unwrap();

        let conn = connection.lock().await;
        let insert = "INSERT INTO folders (owner, name, system, created_at) VALUES (?, ?, 0, 0)";
        conn.execute(insert, ["alice@test.com", "Work"]).unwrap();
        conn.execute(insert, ["bob@test.com", "Work"]).unwrap();
        assert!(conn.execute(insert, ["alice@test.com", "Work"]).is_err());
    }
}
