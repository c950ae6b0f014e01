//! Session-scoped key/value storage backing the watermark.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{current_unix_timestamp_ms, write_text_atomic};

const SESSION_STORAGE_SCHEMA_VERSION: u32 = 1;

/// Key/value store that lives as long as the chat session.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
/// In-process storage; values vanish with the process.
pub struct MemorySessionStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("session storage mutex is poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("session storage mutex is poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionStorageDocument {
    schema_version: u32,
    #[serde(default)]
    updated_unix_ms: u64,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl Default for SessionStorageDocument {
    fn default() -> Self {
        Self {
            schema_version: SESSION_STORAGE_SCHEMA_VERSION,
            updated_unix_ms: 0,
            values: BTreeMap::new(),
        }
    }
}

/// JSON-file storage so a terminal session can resume after a restart.
pub struct FileSessionStorage {
    path: PathBuf,
    document: Mutex<SessionStorageDocument>,
}

impl FileSessionStorage {
    pub fn load(path: PathBuf) -> Result<Self> {
        let document = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read session storage {}", path.display()))?;
            serde_json::from_str::<SessionStorageDocument>(&raw).with_context(|| {
                format!("failed to parse session storage {}", path.display())
            })?
        } else {
            SessionStorageDocument::default()
        };

        if document.schema_version != SESSION_STORAGE_SCHEMA_VERSION {
            bail!(
                "unsupported session storage schema: expected {}, found {}",
                SESSION_STORAGE_SCHEMA_VERSION,
                document.schema_version
            );
        }

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut document = self
            .document
            .lock()
            .map_err(|_| anyhow::anyhow!("session storage mutex is poisoned"))?;
        apply(&mut document.values);
        document.updated_unix_ms = current_unix_timestamp_ms();
        let mut payload = serde_json::to_string_pretty(&*document)
            .context("failed to serialize session storage")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write session storage {}", self.path.display()))
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.document.lock().ok()?.values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{FileSessionStorage, MemorySessionStorage, SessionStorage};

    #[test]
    fn unit_memory_storage_set_get_remove() {
        let storage = MemorySessionStorage::new();
        assert_eq!(storage.get("watermark"), None);
        storage.set("watermark", "7").expect("set");
        assert_eq!(storage.get("watermark").as_deref(), Some("7"));
        storage.remove("watermark").expect("remove");
        assert_eq!(storage.get("watermark"), None);
    }

    #[test]
    fn functional_file_storage_persists_across_reload() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state").join("session.json");
        let storage = FileSessionStorage::load(path.clone()).expect("load empty");
        storage.set("watermark", "a2").expect("set");

        let reloaded = FileSessionStorage::load(path.clone()).expect("reload");
        assert_eq!(reloaded.get("watermark").as_deref(), Some("a2"));
        let raw = std::fs::read_to_string(&path).expect("read raw");
        assert!(raw.contains("\"schema_version\": 1"));
    }

    #[test]
    fn regression_file_storage_rejects_unknown_schema_version() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        std::fs::write(&path, r#"{"schema_version": 9, "values": {}}"#).expect("write");

        let error = match FileSessionStorage::load(path) {
            Ok(_) => panic!("schema 9 should be rejected"),
            Err(error) => error,
        };
        assert!(error
            .to_string()
            .contains("unsupported session storage schema"));
    }

    #[test]
    fn regression_file_storage_reports_corrupt_document() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        std::fs::write(&path, "{not json").expect("write");

        let error = match FileSessionStorage::load(path) {
            Ok(_) => panic!("corrupt document should fail"),
            Err(error) => error,
        };
        assert!(error.to_string().contains("failed to parse session storage"));
    }
}
