// Persistence backends for the message store

use crate::relay::error::{StoreError, StoreResult};
use crate::relay::message::Store;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;

/// Loads and saves the whole store
pub trait StoreBackend: Send + Sync {
    /// Read the full store. Storage that was never written reads as empty.
    fn load(&self) -> StoreResult<Store>;

    /// Replace the persisted store with `store`
    fn save(&self, store: &Store) -> StoreResult<()>;
}

/// A single JSON file mapping recipient to an array of messages.
///
/// Saves go through a uniquely named sibling temp file and a rename, so
/// readers never observe a half-written file and concurrent saves from
/// separate handles never share a staging file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the store file, where temp files are staged
    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn temp_prefix(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "messages.json".to_string());
        format!(".{}.", name)
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> StoreResult<Store> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No store at {:?} yet, starting empty", self.path);
                return Ok(Store::new());
            }
            Err(e) => return Err(StoreError::storage(&self.path, e)),
        };

        let store: Store =
            serde_json::from_str(&raw).map_err(|e| StoreError::corrupt(&self.path, e))?;
        store
            .validate()
            .map_err(|reason| StoreError::corrupt(&self.path, reason))?;

        tracing::debug!(
            "Loaded {} messages from {:?}",
            store.message_count(),
            self.path
        );
        Ok(store)
    }

    fn save(&self, store: &Store) -> StoreResult<()> {
        let dir = self.dir();
        fs::create_dir_all(dir).map_err(|e| StoreError::storage(dir, e))?;

        let json = serde_json::to_vec_pretty(store)
            .map_err(|e| StoreError::corrupt(&self.path, e))?;

        // Each save stages its own uniquely named file, removed on drop if
        // it never gets persisted
        let mut temp = tempfile::Builder::new()
            .prefix(&self.temp_prefix())
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| StoreError::storage(dir, e))?;

        let write_temp = |file: &mut NamedTempFile| -> std::io::Result<()> {
            file.write_all(&json)?;
            file.write_all(b"\n")?;
            file.as_file().sync_all()
        };
        write_temp(&mut temp).map_err(|e| StoreError::storage(temp.path(), e))?;

        temp.persist(&self.path)
            .map_err(|e| StoreError::storage(&self.path, e.error))?;

        tracing::debug!(
            "Saved {} messages to {:?}",
            store.message_count(),
            self.path
        );
        Ok(())
    }
}

/// Volatile backend holding the store in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: RwLock<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing store
    pub fn seeded(store: Store) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Copy of what is currently stored
    pub fn snapshot(&self) -> Store {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Store> {
        Ok(self.snapshot())
    }

    fn save(&self, store: &Store) -> StoreResult<()> {
        let mut guard = self
            .store
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = store.clone();
        Ok(())
    }
}
