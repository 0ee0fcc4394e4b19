//! Temp-file-plus-rename atomic JSON blob store with per-kind ordered
//! indices (spec §4.A, §6). One JSON file per node under
//! `<MEMORY_PATH>/<kind>/<id>.json`, plus `<MEMORY_PATH>/<kind>/index.json`
//! listing ids in creation order. Singleton top-level files (orchestrator
//! state, phi state, coevolution history) live directly under
//! `MEMORY_PATH` and go through the same envelope/versioning path.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::core::{CoreError, Result, StateError, SystemError, Timestamp};

pub const STORE_VERSION: &str = "2.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: String,
    #[serde(flatten)]
    data: Value,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct IndexFile {
    version: String,
    ids: Vec<IndexEntry>,
}

/// Durable, single-writer JSON blob store.
///
/// `atomic()` is the process-wide exclusive section multi-node operations
/// require; cross-process coordination is explicitly out of scope (§4.A:
/// "single writer assumed").
pub struct PersistenceStore {
    root: PathBuf,
    cache: RwLock<HashMap<(String, String), Value>>,
    indices: RwLock<HashMap<String, Vec<IndexEntry>>>,
    write_lock: Mutex<()>,
}

impl PersistenceStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| CoreError::System(SystemError::IoFailure(e.to_string())))?;

        let store = Self {
            root,
            cache: RwLock::new(HashMap::new()),
            indices: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        };
        Ok(store)
    }

    fn kind_dir(&self, kind: &str) -> PathBuf {
        self.root.join(kind)
    }

    fn blob_path(&self, kind: &str, id: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{id}.json"))
    }

    fn index_path(&self, kind: &str) -> PathBuf {
        self.kind_dir(kind).join("index.json")
    }

    /// Run `f` under the process-wide exclusive write lock (§4.A `atomic`).
    pub fn atomic<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?;
        f()
    }

    /// Commit `value` atomically under `(kind, id)`; overwrites in place,
    /// updating the index's creation-time entry only on first insertion.
    pub fn put<T: Serialize>(&self, kind: &str, id: &str, value: &T) -> Result<()> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;

        let data = serde_json::to_value(value)?;
        let envelope = Envelope {
            version: STORE_VERSION.to_string(),
            data,
        };
        let serialized = serde_json::to_vec_pretty(&envelope)?;

        let final_path = self.blob_path(kind, id);
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&final_path)
            .map_err(|e| CoreError::System(SystemError::IoFailure(e.to_string())))?;

        // Cache update happens before the index write returns, so
        // read-after-write within the process never waits on disk.
        self.cache
            .write()
            .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?
            .insert((kind.to_string(), id.to_string()), envelope.data);

        self.append_index_if_new(kind, id)?;
        Ok(())
    }

    fn append_index_if_new(&self, kind: &str, id: &str) -> Result<()> {
        let mut indices = self
            .indices
            .write()
            .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?;
        let entries = match indices.get(kind) {
            Some(entries) => entries.clone(),
            None => self.load_index_from_disk(kind)?,
        };
        let mut entries = entries;
        if !entries.iter().any(|e| e.id == id) {
            entries.push(IndexEntry {
                id: id.to_string(),
                created_at: Utc::now(),
            });
            self.write_index_to_disk(kind, &entries)?;
        }
        indices.insert(kind.to_string(), entries);
        Ok(())
    }

    fn write_index_to_disk(&self, kind: &str, entries: &[IndexEntry]) -> Result<()> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;
        let index_file = IndexFile {
            version: STORE_VERSION.to_string(),
            ids: entries.to_vec(),
        };
        let serialized = serde_json::to_vec_pretty(&index_file)?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(self.index_path(kind))
            .map_err(|e| CoreError::System(SystemError::IoFailure(e.to_string())))?;
        Ok(())
    }

    /// Rebuild the index from the directory listing when the on-disk index
    /// and directory contents disagree (§6: "rebuilt from on-disk files if
    /// the stored index and the directory listing disagree").
    fn load_index_from_disk(&self, kind: &str) -> Result<Vec<IndexEntry>> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let on_disk_ids: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(|s| s.to_string())
            })
            .filter(|name| name != "index")
            .collect();

        let index_path = self.index_path(kind);
        let stored: Option<IndexFile> = if index_path.exists() {
            fs::read_to_string(&index_path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok())
        } else {
            None
        };

        let mut ids_match = false;
        if let Some(ref stored) = stored {
            let mut stored_ids: Vec<&str> = stored.ids.iter().map(|e| e.id.as_str()).collect();
            let mut disk_ids: Vec<&str> = on_disk_ids.iter().map(|s| s.as_str()).collect();
            stored_ids.sort_unstable();
            disk_ids.sort_unstable();
            ids_match = stored_ids == disk_ids;
        }

        if ids_match {
            return Ok(stored.unwrap().ids);
        }

        // Directory listing wins; rebuild entries using file mtime as a
        // stand-in for creation time, sorted for deterministic ordering.
        let mut rebuilt: Vec<IndexEntry> = Vec::with_capacity(on_disk_ids.len());
        for id in on_disk_ids {
            let path = self.blob_path(kind, &id);
            let created_at = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            rebuilt.push(IndexEntry { id, created_at });
        }
        rebuilt.sort_by_key(|e| e.created_at);
        self.write_index_to_disk(kind, &rebuilt)?;
        Ok(rebuilt)
    }

    /// Read a blob, preferring the in-process cache. Quarantines a blob
    /// that fails to parse as JSON (`CorruptBlob`, §4.A).
    pub fn get<T: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<Option<T>> {
        if let Some(value) = self
            .cache
            .read()
            .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?
            .get(&(kind.to_string(), id.to_string()))
        {
            return Ok(Some(serde_json::from_value(value.clone())?));
        }

        let path = self.blob_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)?;
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.quarantine(&path);
                return Err(CoreError::State(StateError::CorruptBlob(format!(
                    "{id}: {e}"
                ))));
            }
        };
        if envelope.version != STORE_VERSION {
            return Err(CoreError::State(StateError::VersionMismatch {
                expected: STORE_VERSION.to_string(),
                found: envelope.version,
            }));
        }

        self.cache
            .write()
            .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?
            .insert((kind.to_string(), id.to_string()), envelope.data.clone());

        Ok(Some(serde_json::from_value(envelope.data)?))
    }

    fn quarantine(&self, path: &Path) {
        let quarantined = path.with_extension("json.corrupt");
        if let Err(e) = fs::rename(path, &quarantined) {
            tracing::warn!(error = %e, path = %path.display(), "failed to quarantine corrupt blob");
        }
    }

    /// List index entries for `kind`, in insertion (creation-time) order.
    pub fn list(&self, kind: &str) -> Result<Vec<IndexEntry>> {
        {
            let indices = self
                .indices
                .read()
                .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?;
            if let Some(entries) = indices.get(kind) {
                return Ok(entries.clone());
            }
        }
        let entries = self.load_index_from_disk(kind)?;
        self.indices
            .write()
            .map_err(|e| CoreError::System(SystemError::InternalInvariant(e.to_string())))?
            .insert(kind.to_string(), entries.clone());
        Ok(entries)
    }

    /// Write a top-level singleton file (`orchestrator_state.json`,
    /// `phi_state.json`, `coevolution_history.json`).
    pub fn put_singleton<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let data = serde_json::to_value(value)?;
        let envelope = Envelope {
            version: STORE_VERSION.to_string(),
            data,
        };
        let serialized = serde_json::to_vec_pretty(&envelope)?;
        let final_path = self.root.join(format!("{name}.json"));
        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        temp.write_all(&serialized)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&final_path)
            .map_err(|e| CoreError::System(SystemError::IoFailure(e.to_string())))?;
        Ok(())
    }

    pub fn get_singleton<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.root.join(format!("{name}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.quarantine(&path);
                return Err(CoreError::State(StateError::CorruptBlob(format!(
                    "{name}: {e}"
                ))));
            }
        };
        if envelope.version != STORE_VERSION {
            return Err(CoreError::State(StateError::VersionMismatch {
                expected: STORE_VERSION.to_string(),
                found: envelope.version,
            }));
        }
        Ok(Some(serde_json::from_value(envelope.data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct Dummy {
        name: String,
        count: u32,
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::open(dir.path()).unwrap();
        let v = Dummy { name: "a".into(), count: 1 };
        store.put("leaves", "leaf_abc", &v).unwrap();
        let got: Dummy = store.get("leaves", "leaf_abc").unwrap().unwrap();
        assert_eq!(got, v);
    }

    #[test]
    fn list_returns_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::open(dir.path()).unwrap();
        for i in 0..3 {
            store
                .put("seeds", &format!("seed_{i}"), &Dummy { name: format!("n{i}"), count: i })
                .unwrap();
        }
        let entries = store.list("seeds").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "seed_0");
        assert_eq!(entries[2].id, "seed_2");
    }

    #[test]
    fn restart_rebuilds_index_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistenceStore::open(dir.path()).unwrap();
            store.put("leaves", "leaf_x", &Dummy { name: "x".into(), count: 0 }).unwrap();
        }
        // Simulate an index file that has drifted out of sync with disk.
        let index_path = dir.path().join("leaves").join("index.json");
        fs::write(&index_path, r#"{"version":"2.0.0","ids":[]}"#).unwrap();

        let store = PersistenceStore::open(dir.path()).unwrap();
        let entries = store.list("leaves").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "leaf_x");
    }

    #[test]
    fn corrupt_blob_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("leaves")).unwrap();
        fs::write(dir.path().join("leaves").join("leaf_bad.json"), "{not json").unwrap();

        let result: Result<Option<Dummy>> = store.get("leaves", "leaf_bad");
        assert!(matches!(result, Err(CoreError::State(StateError::CorruptBlob(_)))));
        assert!(dir.path().join("leaves").join("leaf_bad.json.corrupt").exists());
    }

    #[test]
    fn put_is_atomic_via_tempfile_rename() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::open(dir.path()).unwrap();
        store.put("roots", "root_1", &Dummy { name: "r".into(), count: 9 }).unwrap();
        let path = dir.path().join("roots").join("root_1.json");
        assert!(path.exists());
        // no stray temp files left behind
        let stray = fs::read_dir(dir.path().join("roots"))
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(".tmp"));
        assert!(!stray);
    }
}
