//! Scoped key/value store with debounced persistence.
//!
//! One JSON object `{ key: value }` per storage target. The object is loaded
//! lazily on first access and kept in memory; writes update the cache
//! synchronously and are saved by a background flusher (see [`flush`]).
//!
//! Keys are namespaced by convention (`tracker:<name>[::<doc>]`). The store
//! never validates values; callers clamp what they read.

mod backend;
mod flush;

pub use backend::{Backend, FsBackend, MemoryBackend};
pub use flush::FlushTiming;

use crate::log;
use flush::Flusher;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize value for `{key}`")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write state to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Shared Core
// ============================================================================

struct State {
    path: PathBuf,
    /// `None` until first access
    cache: Option<Map<String, Value>>,
    dirty: bool,
}

impl State {
    fn cache(&mut self, backend: &dyn Backend) -> &mut Map<String, Value> {
        let path = &self.path;
        self.cache.get_or_insert_with(|| load(backend, path))
    }

    /// Serialized snapshot of unsaved changes; clears the dirty flag.
    fn take_pending(&mut self) -> Option<(PathBuf, Vec<u8>)> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        let cache = self.cache.as_ref()?;
        match serde_json::to_vec_pretty(cache) {
            Ok(bytes) => Some((self.path.clone(), bytes)),
            Err(e) => {
                log!("store"; "failed to serialize state: {e}");
                None
            }
        }
    }
}

fn load(backend: &dyn Backend, path: &Path) -> Map<String, Value> {
    let bytes = match backend.read(path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Map::new(),
        Err(e) => {
            log!("store"; "cannot read {}: {e}, starting empty", path.display());
            return Map::new();
        }
    };

    match serde_json::from_slice::<Map<String, Value>>(&bytes) {
        Ok(map) => {
            log!("store"; "loaded {} keys from {}", map.len(), path.display());
            map
        }
        Err(e) => {
            log!("store"; "cannot parse {}: {e}, starting empty", path.display());
            Map::new()
        }
    }
}

pub(crate) struct Core {
    state: Mutex<State>,
    backend: Arc<dyn Backend>,
    /// Serializes writes so an older snapshot never lands after a newer one
    io: Mutex<()>,
}

impl Core {
    fn flush(&self) -> Result<(), StoreError> {
        let _io = self.io.lock();
        let Some((path, bytes)) = self.state.lock().take_pending() else {
            return Ok(());
        };

        self.backend.write(&path, &bytes).map_err(|source| {
            // Keep the changes queued for the next attempt.
            self.state.lock().dirty = true;
            StoreError::Write { path, source }
        })
    }

    /// Flush, logging a failure. Returns false if the write failed.
    fn flush_logged(&self) -> bool {
        match self.flush() {
            Ok(()) => true,
            Err(e) => {
                log!("store"; "{e}: {}", error_chain(&e));
                false
            }
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    e.source().map(|s| s.to_string()).unwrap_or_default()
}

// ============================================================================
// Store Handle
// ============================================================================

struct Inner {
    core: Arc<Core>,
    flusher: Flusher,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.core.flush_logged();
    }
}

/// Handle to a store. Clones share the cache and the flusher; the last
/// handle dropped performs a final flush.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<Inner>,
}

impl KvStore {
    /// A store persisted as a JSON file at `path`.
    pub fn open(path: impl Into<PathBuf>, timing: FlushTiming) -> Self {
        Self::with_backend(path, Arc::new(FsBackend), timing)
    }

    pub fn with_backend(
        path: impl Into<PathBuf>,
        backend: Arc<dyn Backend>,
        timing: FlushTiming,
    ) -> Self {
        let core = Arc::new(Core {
            state: Mutex::new(State {
                path: path.into(),
                cache: None,
                dirty: false,
            }),
            backend,
            io: Mutex::new(()),
        });
        let flusher = Flusher::spawn(core.clone(), timing);

        Self {
            inner: Arc::new(Inner { core, flusher }),
        }
    }

    fn core(&self) -> &Core {
        &self.inner.core
    }

    /// Current storage target.
    pub fn path(&self) -> PathBuf {
        self.core().state.lock().path.clone()
    }

    /// Value at `key`, or `fallback` when absent or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.get_value(key)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(fallback)
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        let core = self.core();
        let mut state = core.state.lock();
        state.cache(core.backend.as_ref()).get(key).cloned()
    }

    /// Store `value` at `key` and schedule a flush. Visible to `get` at once.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.set_value(key, value);
        Ok(())
    }

    pub fn set_value(&self, key: &str, value: Value) {
        {
            let core = self.core();
            let mut state = core.state.lock();
            state.cache(core.backend.as_ref()).insert(key.to_string(), value);
            state.dirty = true;
        }
        self.inner.flusher.notify();
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let core = self.core();
            let mut state = core.state.lock();
            let removed = state.cache(core.backend.as_ref()).remove(key);
            state.dirty |= removed.is_some();
            removed
        };
        if removed.is_some() {
            self.inner.flusher.notify();
        }
        removed
    }

    /// Exactly `len` flags at `key`.
    ///
    /// A stored array of another length is truncated or padded with `false`,
    /// and the repaired array is written back. Missing keys yield all `false`
    /// without a write.
    pub fn get_bool_array(&self, key: &str, len: usize) -> Vec<bool> {
        let Some(value) = self.get_value(key) else {
            return vec![false; len];
        };

        let mut flags: Vec<bool> = match &value {
            Value::Array(items) => items.iter().map(|v| v.as_bool().unwrap_or(false)).collect(),
            _ => Vec::new(),
        };

        let canonical = matches!(&value, Value::Array(items)
            if items.len() == len && items.iter().all(Value::is_boolean));
        if !canonical {
            flags.resize(len, false);
            self.set_bool_array(key, &flags);
        }
        flags
    }

    pub fn set_bool_array(&self, key: &str, flags: &[bool]) {
        self.set_value(key, Value::Array(flags.iter().map(|&b| Value::Bool(b)).collect()));
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> Map<String, Value> {
        let core = self.core();
        let mut state = core.state.lock();
        state.cache(core.backend.as_ref()).clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    /// Write pending changes now.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.core().flush()
    }

    /// Switch to a new storage target.
    ///
    /// Pending changes are saved to the old target first; the new target is
    /// loaded lazily on next access.
    pub fn reinit(&self, path: impl Into<PathBuf>) -> Result<(), StoreError> {
        let core = self.core();
        let _io = core.io.lock();

        let pending = {
            let mut state = core.state.lock();
            let pending = state.take_pending();
            state.path = path.into();
            state.cache = None;
            state.dirty = false;
            pending
        };

        match pending {
            Some((old, bytes)) => core
                .backend
                .write(&old, &bytes)
                .map_err(|source| StoreError::Write { path: old, source }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{thread, time::Duration};
    use tempfile::TempDir;

    fn memory_store(timing: FlushTiming) -> (KvStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::with_backend("state.json", backend.clone(), timing);
        (store, backend)
    }

    fn slow() -> FlushTiming {
        FlushTiming {
            debounce: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
        }
    }

    fn stored(backend: &MemoryBackend, path: &str) -> Value {
        let bytes = backend.contents(Path::new(path)).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_get_sees_set_before_flush() {
        let (store, backend) = memory_store(slow());
        store.set("tracker:hp", &3).unwrap();

        assert_eq!(store.get("tracker:hp", 0u32), 3);
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_get_falls_back_on_missing_or_mismatched() {
        let (store, _) = memory_store(slow());
        assert_eq!(store.get("missing", 7), 7);

        store.set("name", "Aria").unwrap();
        assert_eq!(store.get("name", 0), 0);
        assert_eq!(store.get("name", String::new()), "Aria");
    }

    #[test]
    fn test_lazy_load_reads_existing_state() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("state.json", r#"{"tracker:hp": 4}"#);
        let store = KvStore::with_backend("state.json", backend, slow());

        assert_eq!(store.get("tracker:hp", 0), 4);
    }

    #[test]
    fn test_corrupt_state_loads_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("state.json", "{ not json");
        let store = KvStore::with_backend("state.json", backend.clone(), slow());

        assert!(store.snapshot().is_empty());
        store.set("k", &1).unwrap();
        store.flush().unwrap();
        assert_eq!(stored(&backend, "state.json"), json!({ "k": 1 }));
    }

    #[test]
    fn test_bool_array_repairs_length() {
        let (store, backend) = memory_store(slow());
        store.set("checks", &[true, false, true, true]).unwrap();
        store.flush().unwrap();

        assert_eq!(store.get_bool_array("checks", 2), vec![true, false]);
        assert_eq!(store.get_bool_array("checks", 4), vec![true, false, false, false]);
        // Canonical arrays are not rewritten.
        store.flush().unwrap();
        let writes = backend.write_count();
        assert_eq!(store.get_bool_array("checks", 4), vec![true, false, false, false]);
        store.flush().unwrap();
        assert_eq!(backend.write_count(), writes);
    }

    #[test]
    fn test_bool_array_missing_is_all_false_without_write() {
        let (store, _) = memory_store(slow());
        assert_eq!(store.get_bool_array("nope", 3), vec![false; 3]);
        assert!(store.get_value("nope").is_none());
    }

    #[test]
    fn test_debounced_writes_coalesce() {
        let timing = FlushTiming {
            debounce: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
        };
        let (store, backend) = memory_store(timing);
        for n in 0..10 {
            store.set("counter", &n).unwrap();
        }

        thread::sleep(Duration::from_millis(400));
        assert_eq!(backend.write_count(), 1);
        assert_eq!(stored(&backend, "state.json"), json!({ "counter": 9 }));
    }

    /// Fails the first `failures` writes, then behaves like memory.
    #[derive(Default)]
    struct FlakyBackend {
        failures: std::sync::atomic::AtomicUsize,
        inner: MemoryBackend,
    }

    impl Backend for FlakyBackend {
        fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
            self.inner.read(path)
        }

        fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
            use std::sync::atomic::Ordering;
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(io::Error::other("disk full"));
            }
            self.inner.write(path, bytes)
        }
    }

    #[test]
    fn test_failed_flush_is_retried_without_new_writes() {
        let backend = Arc::new(FlakyBackend {
            failures: 2.into(),
            ..Default::default()
        });
        let timing = FlushTiming {
            debounce: Duration::from_millis(20),
            max_delay: Duration::from_secs(5),
        };
        let store = KvStore::with_backend("state.json", backend.clone(), timing);
        store.set("tracker:hp", &3).unwrap();

        thread::sleep(Duration::from_millis(500));
        assert_eq!(backend.inner.write_count(), 1);
        assert_eq!(stored(&backend.inner, "state.json"), json!({ "tracker:hp": 3 }));
    }

    #[test]
    fn test_flush_without_changes_is_noop() {
        let (store, backend) = memory_store(slow());
        store.flush().unwrap();
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_reinit_flushes_old_and_invalidates_cache() {
        let (store, backend) = memory_store(slow());
        backend.insert("other.json", r#"{"k": "other"}"#);
        store.set("k", "first").unwrap();

        store.reinit("other.json").unwrap();
        assert_eq!(stored(&backend, "state.json"), json!({ "k": "first" }));
        assert_eq!(store.get("k", String::new()), "other");
        assert_eq!(store.path(), PathBuf::from("other.json"));
    }

    #[test]
    fn test_drop_performs_final_flush() {
        let (store, backend) = memory_store(slow());
        let clone = store.clone();
        store.set("k", &true).unwrap();

        drop(store);
        assert_eq!(backend.write_count(), 0);
        drop(clone);
        assert_eq!(stored(&backend, "state.json"), json!({ "k": true }));
    }

    #[test]
    fn test_remove() {
        let (store, _) = memory_store(slow());
        store.set("a", &1).unwrap();
        assert_eq!(store.remove("a"), Some(json!(1)));
        assert_eq!(store.remove("a"), None);
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_filesystem_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".sheetblocks/state.json");

        let store = KvStore::open(&path, slow());
        store.set("tracker:hp::hero.md", &2).unwrap();
        store.set_bool_array("checklist:prep", &[true, false]);
        drop(store);

        let reopened = KvStore::open(&path, slow());
        assert_eq!(reopened.get("tracker:hp::hero.md", 0), 2);
        assert_eq!(reopened.get_bool_array("checklist:prep", 2), vec![true, false]);
    }
}
