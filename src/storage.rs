use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::warn;

use crate::error::Result;
use crate::models::{Task, UserId};
use crate::normalize::normalize_blob;

/// Key holding the JSON array of local tasks.
pub const TASKS_KEY: &str = "tasks";
/// Key holding the id of the last account that signed in.
pub const LAST_USER_KEY: &str = "last_login_user_id";
const MIGRATED_PREFIX: &str = "migrated_";

/// Synchronous string key-value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Key-value store backed by a single JSON object on disk (`store.json`).
pub struct FileKvStore {
    path: PathBuf,
}

impl FileKvStore {
    /// Opens (lazily) the store file inside `dir`, creating the directory.
    pub fn in_dir(dir: &Path) -> Result<FileKvStore> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(FileKvStore { path: dir.join("store.json") })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries. A missing file is an empty store; a corrupt file is
    /// treated as empty too so the app stays usable.
    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let mut f = OpenOptions::new().read(true).open(&self.path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Ok(serde_json::from_str(&s).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "corrupt key-value store, starting empty");
            BTreeMap::new()
        }))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let s = serde_json::to_string_pretty(entries)?;
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Deletes the store file.
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// In-process store. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryKvStore {
    pub fn new() -> MemoryKvStore {
        MemoryKvStore::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Typed access to the local task blob and the reconciliation markers.
pub struct LocalStore {
    kv: Box<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> LocalStore {
        LocalStore { kv }
    }

    /// Loads and repairs the local task blob. Absent blob means no tasks.
    pub fn load_tasks(&self) -> Result<Vec<Task>> {
        Ok(match self.kv.get(TASKS_KEY)? {
            Some(blob) => normalize_blob(&blob, Utc::now()),
            None => Vec::new(),
        })
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        let blob = serde_json::to_string(tasks)?;
        self.kv.set(TASKS_KEY, &blob)
    }

    pub fn clear_tasks(&self) -> Result<()> {
        self.kv.remove(TASKS_KEY)
    }

    pub fn last_user(&self) -> Result<Option<UserId>> {
        self.kv.get(LAST_USER_KEY)
    }

    pub fn set_last_user(&self, user: &str) -> Result<()> {
        self.kv.set(LAST_USER_KEY, user)
    }

    pub fn clear_last_user(&self) -> Result<()> {
        self.kv.remove(LAST_USER_KEY)
    }

    pub fn is_migrated(&self, user: &str) -> Result<bool> {
        Ok(self.kv.get(&migrated_key(user))?.as_deref() == Some("true"))
    }

    pub fn set_migrated(&self, user: &str) -> Result<()> {
        self.kv.set(&migrated_key(user), "true")
    }
}

fn migrated_key(user: &str) -> String {
    format!("{MIGRATED_PREFIX}{user}")
}
