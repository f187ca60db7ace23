//! Durable key/value persistence for in-progress form state.
//!
//! A `StorageArea` is a directory holding one checksummed file per key. Every
//! `PersistentField` bound to the area is a separate context: writes go to disk
//! immediately and are announced to the other contexts over a broadcast channel,
//! which fold them into their local value on `sync`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::store_integrity::StoredEntry;

/// Key holding the in-progress registration form (or `null`).
pub const REGISTRATION_FORM_KEY: &str = "registrationFormData";
/// Key holding the ordered list of OCR-populated field names.
pub const OCR_FIELDS_KEY: &str = "ocrUpdatedFields";

const EVENT_CAPACITY: usize = 64;

/// A change made to one key of a storage area.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    /// Serialized new value; `None` when the key was removed.
    pub new_value: Option<String>,
    /// Context that made the change.
    pub origin: Uuid,
}

/// Directory-backed storage shared by every context of one process.
#[derive(Debug)]
pub struct StorageArea {
    dir: PathBuf,
    events: broadcast::Sender<StorageEvent>,
}

fn validate_key(key: &str) -> Result<(), AppError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "storage key '{}' may only contain letters, digits, '_' and '-'",
            key
        )))
    }
}

impl StorageArea {
    /// Opens (creating if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Arc<Self>, AppError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Creating storage directory {}", dir.display()))?;

        tracing::debug!("Opened storage area at {}", dir.display());

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(Self { dir, events }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Reads the serialized value of `key`.
    ///
    /// A missing file is `Ok(None)`; a file whose checksum does not match is
    /// also treated as absent.
    pub fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.path_for(key)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(StoredEntry::deserialize_and_validate(&raw))
    }

    /// Persists `value` under `key` and notifies the other contexts.
    pub fn set_item(&self, origin: Uuid, key: &str, value: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        let envelope = StoredEntry::new(value.to_string()).serialize()?;

        // Write-then-rename so a crash never leaves half a file behind.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, envelope).with_context(|| format!("Writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("Replacing {}", path.display()))?;

        self.notify(StorageEvent {
            key: key.to_string(),
            new_value: Some(value.to_string()),
            origin,
        });
        Ok(())
    }

    pub fn remove_item(&self, origin: Uuid, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Removing {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        self.notify(StorageEvent {
            key: key.to_string(),
            new_value: None,
            origin,
        });
        Ok(())
    }

    /// Receiver for every change made through this area.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StorageEvent) {
        // No receivers is fine: nobody else has the key open.
        let _ = self.events.send(event);
    }
}

/// One context's view of a persisted value.
///
/// Reads never fail: an absent or undecodable value becomes `default`. Writes
/// update the local value first, then persist; persistence failures are logged.
pub struct PersistentField<T> {
    area: Arc<StorageArea>,
    key: String,
    default: T,
    value: T,
    origin: Uuid,
    events: broadcast::Receiver<StorageEvent>,
}

impl<T> PersistentField<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(area: Arc<StorageArea>, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let events = area.subscribe();
        let value = Self::load(&area, &key, &default);

        Self {
            area,
            key,
            default,
            value,
            origin: Uuid::new_v4(),
            events,
        }
    }

    fn load(area: &StorageArea, key: &str, default: &T) -> T {
        match area.get_item(key) {
            Ok(Some(raw)) => Self::decode(key, &raw, default),
            Ok(None) => default.clone(),
            Err(e) => {
                tracing::warn!("Error reading storage key \"{}\": {}", key, e);
                default.clone()
            }
        }
    }

    fn decode(key: &str, raw: &str, default: &T) -> T {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!("Error parsing storage key \"{}\": {}", key, e);
            default.clone()
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replaces the value and persists it.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.persist();
    }

    /// Derives the new value from the previous one and persists it.
    pub fn update(&mut self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value);
        self.set(next);
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.value)
            .map_err(AppError::from)
            .and_then(|raw| self.area.set_item(self.origin, &self.key, &raw));

        if let Err(e) = result {
            tracing::error!("Error setting storage key \"{}\": {}", self.key, e);
        }
    }

    /// Folds changes made by other contexts into the local value.
    ///
    /// Returns `true` when the local value changed.
    pub fn sync(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if event.key != self.key || event.origin == self.origin {
                        continue;
                    }
                    self.value = match event.new_value {
                        Some(raw) => Self::decode(&self.key, &raw, &self.default),
                        None => self.default.clone(),
                    };
                    changed = true;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Missed {} storage events for \"{}\", reloading",
                        skipped,
                        self.key
                    );
                    self.refresh();
                    changed = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        changed
    }

    /// Re-reads the value from disk, picking up writes from other processes.
    pub fn refresh(&mut self) {
        self.value = Self::load(&self.area, &self.key, &self.default);
    }
}
