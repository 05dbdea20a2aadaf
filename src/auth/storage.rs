//! Durable storage backends for the token bundle.
//!
//! The session survives process restarts by mirroring its token fields to a
//! `TokenStorage`. Reads that fail degrade to "absent"; writes and removes
//! report their failure so the token store can log and move on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use keyring::Entry;

/// Token file name in the config directory
const TOKEN_FILE: &str = "tokens.json";

/// Key-value contract for persisting the token bundle.
pub trait TokenStorage: Send + Sync {
    /// Read a value; any backend failure is treated as absent.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: TokenStorage + ?Sized> TokenStorage for Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// File-backed storage: a single JSON object holding all keys.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the user config directory.
    pub fn default_path(app_name: &str) -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(app_name).join(TOKEN_FILE))
    }

    /// A missing or corrupt file reads as empty.
    fn read_map(&self) -> HashMap<String, String> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&contents).unwrap_or_default()
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, contents).context("Failed to write token file")?;
        Ok(())
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Keychain-backed storage via the OS credential store.
///
/// Each bundle field is its own keychain entry, with the storage key as the
/// account name.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl TokenStorage for KeyringStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entry(key).ok()?.get_password().ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            // An already-absent entry is a successful remove
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err).context("Failed to delete token from keychain"),
        }
    }
}

/// In-process storage for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vaultgate-test-{}-{}.json", std::process::id(), name))
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("at"), None);

        storage.set("at", "token").unwrap();
        assert_eq!(storage.get("at").as_deref(), Some("token"));

        storage.remove("at").unwrap();
        assert_eq!(storage.get("at"), None);
    }

    #[test]
    fn test_file_storage_round_trip() {
        let path = temp_path("round-trip");
        let storage = FileStorage::new(path.clone());

        storage.set("at", "token").unwrap();
        storage.set("exp", "12345").unwrap();
        assert_eq!(storage.get("at").as_deref(), Some("token"));
        assert_eq!(storage.get("exp").as_deref(), Some("12345"));

        storage.remove("at").unwrap();
        assert_eq!(storage.get("at"), None);
        assert_eq!(storage.get("exp").as_deref(), Some("12345"));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_file_storage_treats_corrupt_file_as_empty() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json at all").unwrap();

        let storage = FileStorage::new(path.clone());
        assert_eq!(storage.get("at"), None);

        // Writes recover the file
        storage.set("at", "token").unwrap();
        assert_eq!(storage.get("at").as_deref(), Some("token"));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let path = temp_path("missing-key");
        let storage = FileStorage::new(path.clone());
        storage.remove("never-set").unwrap();
        let _ = std::fs::remove_file(path);
    }
}
