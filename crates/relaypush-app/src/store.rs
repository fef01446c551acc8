//! Persisted key-value state
//!
//! The registration state lives in a small string-keyed store injected into
//! the state machine and the fetch dispatcher. [`PushValues`] is the typed
//! view over the three keys relaypush owns.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use fs2::FileExt;
use relaypush_core::prelude::*;
use relaypush_core::{Endpoint, RegistrationSnapshot, RegistrationStatus};

/// Keys owned by relaypush
pub mod keys {
    pub const ENDPOINT: &str = "relaypush.endpoint";
    pub const STATUS: &str = "relaypush.status";
    pub const LAST_FOREGROUND_FETCH_MS: &str = "relaypush.last_foreground_fetch_ms";
}

/// String key-value storage, internally synchronized
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::store("store lock poisoned")
}

// ─────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────

/// Volatile store, used by tests and by `relaypushd --state :memory:`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────────────────────────

/// JSON object on disk, cached in memory
///
/// Every write rewrites the whole file through a temp file and a rename.
/// An advisory lock on `<path>.lock` is held for the lifetime of the store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    _lock: File,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// A missing file is an empty store. A file that is not a JSON object of
    /// strings is [`Error::CorruptState`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::store(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let lock_path = sidecar(&path, "lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                Error::store(format!("Failed to open {}: {}", lock_path.display(), e))
            })?;
        lock.try_lock_exclusive().map_err(|_| {
            Error::store(format!(
                "State file {} is in use by another process",
                path.display()
            ))
        })?;

        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                warn!("Failed to parse {}: {}", path.display(), e);
                Error::CorruptState { path: path.clone() }
            })?
        } else {
            debug!("No state file at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let tmp = sidecar(&self.path, "tmp");
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&tmp, content)
            .map_err(|e| Error::store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            Error::store(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }

    /// Apply `change` to the cached map and persist it; the cache is restored
    /// if the write fails
    fn update<F>(&self, key: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Option<String>,
    {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let previous = change(&mut entries);

        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(value) => entries.insert(key.to_string(), value),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.update(key, |entries| {
            entries.insert(key.to_string(), value.to_string())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.get(key)?.is_none() {
            return Ok(());
        }
        self.update(key, |entries| entries.remove(key))
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

// ─────────────────────────────────────────────────────────────────
// Typed view
// ─────────────────────────────────────────────────────────────────

/// Typed accessors for the relaypush keys
pub struct PushValues {
    store: Arc<dyn KeyValueStore>,
    /// Serializes endpoint compare-and-set against endpoint clears
    endpoint_lock: Mutex<()>,
    /// Serializes status writes against the air-gapped mode switch
    status_lock: Mutex<()>,
}

impl PushValues {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            endpoint_lock: Mutex::new(()),
            status_lock: Mutex::new(()),
        }
    }

    /// Convenience constructor over a fresh [`InMemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn endpoint(&self) -> Result<Option<Endpoint>> {
        Ok(self.store.get(keys::ENDPOINT)?.map(Endpoint::from))
    }

    /// Store `endpoint` unless it is already the stored one
    ///
    /// Returns `true` when the stored value changed. Comparison and write
    /// happen under one lock, so of two concurrent calls with the same new
    /// endpoint exactly one returns `true`.
    pub fn replace_endpoint(&self, endpoint: &Endpoint) -> Result<bool> {
        let _guard = self.endpoint_lock.lock().map_err(poisoned)?;
        if self.endpoint()?.as_ref() == Some(endpoint) {
            return Ok(false);
        }
        self.store.put(keys::ENDPOINT, endpoint.as_str())?;
        Ok(true)
    }

    pub fn clear_endpoint(&self) -> Result<()> {
        let _guard = self.endpoint_lock.lock().map_err(poisoned)?;
        self.store.remove(keys::ENDPOINT)
    }

    /// Stored status; absent or unreadable values read as `Unconfigured`
    pub fn status(&self) -> Result<RegistrationStatus> {
        let Some(raw) = self.store.get(keys::STATUS)? else {
            return Ok(RegistrationStatus::Unconfigured);
        };
        match raw.trim().parse::<u8>() {
            Ok(ordinal) => Ok(RegistrationStatus::from_ordinal(ordinal)),
            Err(_) => {
                warn!("Ignoring unreadable registration status {:?}", raw);
                Ok(RegistrationStatus::Unconfigured)
            }
        }
    }

    pub fn set_status(&self, status: RegistrationStatus) -> Result<()> {
        let _guard = self.status_lock.lock().map_err(poisoned)?;
        self.write_status(status)
    }

    /// Store a relay outcome unless the user switched to air-gapped mode
    ///
    /// Returns `false`, leaving `AirGapped` in place, when the mode switch
    /// landed while the relay call was in flight.
    pub fn record_relay_result(&self, status: RegistrationStatus) -> Result<bool> {
        let _guard = self.status_lock.lock().map_err(poisoned)?;
        if self.status()? == RegistrationStatus::AirGapped {
            return Ok(false);
        }
        self.write_status(status)?;
        Ok(true)
    }

    /// Enter (`AirGapped`) or leave (`Unconfigured`) air-gapped mode
    ///
    /// Returns `false` when already in the requested mode.
    pub fn switch_air_gapped(&self, enabled: bool) -> Result<bool> {
        let _guard = self.status_lock.lock().map_err(poisoned)?;
        let air_gapped = self.status()? == RegistrationStatus::AirGapped;
        if air_gapped == enabled {
            return Ok(false);
        }
        self.write_status(if enabled {
            RegistrationStatus::AirGapped
        } else {
            RegistrationStatus::Unconfigured
        })?;
        Ok(true)
    }

    fn write_status(&self, status: RegistrationStatus) -> Result<()> {
        self.store.put(keys::STATUS, &status.ordinal().to_string())
    }

    /// Epoch millis of the last foreground fetch; 0 when never stamped
    pub fn last_foreground_fetch_ms(&self) -> Result<u64> {
        let Some(raw) = self.store.get(keys::LAST_FOREGROUND_FETCH_MS)? else {
            return Ok(0);
        };
        Ok(raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unreadable foreground fetch time {:?}", raw);
            0
        }))
    }

    pub fn set_last_foreground_fetch_ms(&self, now_ms: u64) -> Result<()> {
        self.store
            .put(keys::LAST_FOREGROUND_FETCH_MS, &now_ms.to_string())
    }

    pub fn snapshot(&self) -> Result<RegistrationSnapshot> {
        Ok(RegistrationSnapshot {
            endpoint: self.endpoint()?,
            status: self.status()?,
        })
    }
}

impl std::fmt::Debug for PushValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushValues").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_in_memory_store_get_put_remove() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.put("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.put(keys::ENDPOINT, "https://push.example/1").unwrap();
            store.put(keys::STATUS, "2").unwrap();
            store.remove(keys::STATUS).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(
            store.get(keys::ENDPOINT).unwrap(),
            Some("https://push.example/1".to_string())
        );
        assert_eq!(store.get(keys::STATUS).unwrap(), None);
        assert!(!sidecar(&path, "tmp").exists());
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.put("k", "v").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json at all").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_file_store_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let _first = FileStore::open(&path).unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }

    #[test]
    fn test_status_defaults_and_round_trips() {
        let values = PushValues::in_memory();
        assert_eq!(values.status().unwrap(), RegistrationStatus::Unconfigured);

        for status in RegistrationStatus::ALL {
            values.set_status(status).unwrap();
            assert_eq!(values.status().unwrap(), status);
        }
    }

    #[test]
    fn test_status_stored_as_ordinal() {
        let store = Arc::new(InMemoryStore::new());
        let values = PushValues::new(store.clone());

        values.set_status(RegistrationStatus::MissingEndpoint).unwrap();
        assert_eq!(store.get(keys::STATUS).unwrap(), Some("4".to_string()));

        store.put(keys::STATUS, "garbage").unwrap();
        assert_eq!(values.status().unwrap(), RegistrationStatus::Unconfigured);
    }

    #[test]
    fn test_replace_endpoint_reports_change() {
        let values = PushValues::in_memory();
        let a = Endpoint::new("https://push.example/a");
        let b = Endpoint::new("https://push.example/b");

        assert!(values.replace_endpoint(&a).unwrap());
        assert!(!values.replace_endpoint(&a).unwrap());
        assert!(values.replace_endpoint(&b).unwrap());
        assert_eq!(values.endpoint().unwrap(), Some(b));

        values.clear_endpoint().unwrap();
        assert_eq!(values.endpoint().unwrap(), None);
    }

    #[test]
    fn test_concurrent_replace_endpoint_has_one_winner() {
        let values = Arc::new(PushValues::in_memory());
        let endpoint = Endpoint::new("https://push.example/same");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let values = Arc::clone(&values);
                let endpoint = endpoint.clone();
                std::thread::spawn(move || values.replace_endpoint(&endpoint).unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_switch_air_gapped_reports_change() {
        let values = PushValues::in_memory();
        values.set_status(RegistrationStatus::Registered).unwrap();

        assert!(values.switch_air_gapped(true).unwrap());
        assert!(!values.switch_air_gapped(true).unwrap());
        assert_eq!(values.status().unwrap(), RegistrationStatus::AirGapped);

        assert!(values.switch_air_gapped(false).unwrap());
        assert!(!values.switch_air_gapped(false).unwrap());
        assert_eq!(values.status().unwrap(), RegistrationStatus::Unconfigured);
    }

    #[test]
    fn test_relay_result_does_not_override_air_gapped() {
        let values = PushValues::in_memory();
        assert!(values
            .record_relay_result(RegistrationStatus::InternalError)
            .unwrap());
        assert_eq!(values.status().unwrap(), RegistrationStatus::InternalError);

        values.switch_air_gapped(true).unwrap();
        assert!(!values
            .record_relay_result(RegistrationStatus::Registered)
            .unwrap());
        assert_eq!(values.status().unwrap(), RegistrationStatus::AirGapped);
    }

    #[test]
    fn test_last_foreground_fetch_defaults_to_zero() {
        let store = Arc::new(InMemoryStore::new());
        let values = PushValues::new(store.clone());
        assert_eq!(values.last_foreground_fetch_ms().unwrap(), 0);

        values.set_last_foreground_fetch_ms(1_700_000_000_000).unwrap();
        assert_eq!(values.last_foreground_fetch_ms().unwrap(), 1_700_000_000_000);

        store.put(keys::LAST_FOREGROUND_FETCH_MS, "soon").unwrap();
        assert_eq!(values.last_foreground_fetch_ms().unwrap(), 0);
    }

    #[test]
    fn test_snapshot_reads_both_values() {
        let values = PushValues::in_memory();
        values
            .replace_endpoint(&Endpoint::new("https://push.example/x"))
            .unwrap();
        values.set_status(RegistrationStatus::Registered).unwrap();

        let snapshot = values.snapshot().unwrap();
        assert_eq!(snapshot.endpoint, Some(Endpoint::new("https://push.example/x")));
        assert_eq!(snapshot.status, RegistrationStatus::Registered);
    }
}
