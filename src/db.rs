use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistent key-value storage used by components that need to survive a
/// restart.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
    fn set(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn sync(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub struct Db {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Opening persistent DB file {}", path.display());
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl KvStore for Db {
    fn get(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        log::debug!("Assigning persistent DB key \"{}\"", key);
        Ok(())
    }

    /// Every `set` is its own committed statement, so this only flushes the
    /// WAL if one is in use.
    fn sync(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::debug!("Syncing persistent DB file {}", self.path.display());
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Db {
        Db::open(Path::new(":memory:")).unwrap()
    }

    #[test]
    fn test_get_missing_key() {
        let db = setup_db();
        assert_eq!(db.get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_and_get() {
        let db = setup_db();
        db.set("cron.onetime", "{}").unwrap();
        assert_eq!(db.get("cron.onetime").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_set_overwrites() {
        let db = setup_db();
        db.set("motd", "first").unwrap();
        db.set("motd", "second").unwrap();
        assert_eq!(db.get("motd").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_sync_succeeds() {
        let db = setup_db();
        db.set("a", "1").unwrap();
        db.sync().unwrap();
    }
}
