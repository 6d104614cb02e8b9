use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

mod schema;

/// String key-value persistence, the shape the note collection is stored in.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }
}

impl KeyValueStore for StorageHandle {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("reading stored value {key}"))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing stored value {key}"))?;
            Ok(())
        })
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        let config_dir = base.join("config");
        let data_dir = base.join("data");
        let state_dir = base.join("state");
        ConfigPaths {
            config_dir: config_dir.clone(),
            config_file: config_dir.join("config.toml"),
            data_dir: data_dir.clone(),
            database_path: data_dir.join("flick.db"),
            cache_dir: base.join("cache"),
            log_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    pub fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let storage = init(&paths, &StorageOptions::default())?;
        Ok((temp, storage))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::init_storage;
    use super::*;

    #[test]
    fn set_then_get_round_trips() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_eq!(storage.get("flick")?, None);
        storage.set("flick", "[]")?;
        assert_eq!(storage.get("flick")?.as_deref(), Some("[]"));
        Ok(())
    }

    #[test]
    fn set_overwrites_existing_value() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set("flick", "first")?;
        storage.set("flick", "second")?;
        assert_eq!(storage.get("flick")?.as_deref(), Some("second"));
        Ok(())
    }

    #[test]
    fn keys_are_independent() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set("flick", "[]")?;
        storage.set("flick.corrupt-1700000000", "{broken")?;
        assert_eq!(storage.get("flick")?.as_deref(), Some("[]"));
        assert_eq!(
            storage.get("flick.corrupt-1700000000")?.as_deref(),
            Some("{broken")
        );
        Ok(())
    }

    #[test]
    fn values_survive_reopening() -> anyhow::Result<()> {
        let (temp, storage) = init_storage()?;
        storage.set("flick", "persisted")?;
        drop(storage);
        let paths = test_support::temp_paths(&temp);
        let reopened = init(&paths, &StorageOptions::default())?;
        assert_eq!(reopened.get("flick")?.as_deref(), Some("persisted"));
        Ok(())
    }
}
