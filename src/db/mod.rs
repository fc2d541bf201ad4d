mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::store::{KeyValueStore, Tier};

/// On-device SQLite database holding the key-value entries.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        restrict_permissions(&path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Entry operations
    // ============================================================

    pub fn get_entry(&self, tier: Tier, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE key = ? AND tier = ?",
                (key, tier.as_str()),
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put_entry(&self, tier: Tier, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entries (key, tier, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (key, tier) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, tier.as_str(), value, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn delete_entry(&self, tier: Tier, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM entries WHERE key = ? AND tier = ?",
            (key, tier.as_str()),
        )?;
        Ok(rows > 0)
    }
}

impl KeyValueStore for Database {
    fn read(&self, tier: Tier, key: &str) -> Result<Option<String>> {
        self.get_entry(tier, key)
    }

    fn write(&self, tier: Tier, key: &str, value: &str) -> Result<()> {
        self.put_entry(tier, key, value)
    }

    fn delete(&self, tier: Tier, key: &str) -> Result<()> {
        self.delete_entry(tier, key).map(|_| ())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Platform data directory for memoize (e.g. `~/.local/share/memoize`).
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "memoize")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> Result<()> {
    Ok(())
}
