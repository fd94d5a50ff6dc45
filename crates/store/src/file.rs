//! Durable key-value store persisted as a single JSON object file.
//!
//! Every read goes to disk so that a logout from another process is visible
//! on the next read. Writes go to a sibling temp file that is renamed over
//! the original.

use linglear_types::{KeyValueStore, LinglearError, Result};
use serde_json::{Map, Value};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// A persistent [`KeyValueStore`] backed by a JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens (without creating) the store at `path`.
    ///
    /// The parent directory is created lazily on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(LinglearError::Storage(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_map()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), Value::String(value.to_string()));
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.read_map()?.contains_key(key) {
            self.update(|map| {
                map.remove(key);
            })
        } else {
            Ok(())
        }
    }
}
