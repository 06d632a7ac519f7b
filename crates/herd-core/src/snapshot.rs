//! Durable device snapshot: the prior todo view, id mapping, sync cursor,
//! and pending-change set.
//!
//! The snapshot is one JSON document. Writes are atomic (sibling temp
//! file, fsync, rename); a `.bak` sidecar is taken before a cycle mutates
//! anything. A document that cannot be decoded or is missing required
//! fields halts the sync; no silent reset.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::TodoFields;

/// A todo as this device last saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTodo {
    #[serde(flatten)]
    pub fields: TodoFields,
    pub edited_at: DateTime<Utc>,
}

/// Pending changes not yet accepted by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtySet {
    /// Local ids with un-pushed creates or edits.
    #[serde(default)]
    pub upserted: BTreeSet<String>,
    /// Server ids with un-pushed deletions, keyed to the deletion instant.
    #[serde(default)]
    pub deleted: BTreeMap<String, DateTime<Utc>>,
}

impl DirtySet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.deleted.is_empty()
    }
}

/// The entire persistent state of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Server timestamp cursor from the prior successful pull.
    pub last_synced_at: DateTime<Utc>,
    /// Device-local id → last-known record.
    pub todos: BTreeMap<String, LocalTodo>,
    /// Server id → device-local id.
    pub server_id_to_local_id: BTreeMap<String, String>,
    pub dirty: DirtySet,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            last_synced_at: DateTime::UNIX_EPOCH,
            todos: BTreeMap::new(),
            server_id_to_local_id: BTreeMap::new(),
            dirty: DirtySet::default(),
        }
    }
}

/// Raw on-disk shape. Required fields are enforced here; per-record
/// optional fields are tolerated for snapshots written by older builds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    last_synced_at: DateTime<Utc>,
    todos: BTreeMap<String, RawTodo>,
    server_id_to_local_id: BTreeMap<String, String>,
    #[serde(default)]
    dirty: DirtySet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTodo {
    #[serde(flatten)]
    fields: TodoFields,
    #[serde(default)]
    edited_at: Option<DateTime<Utc>>,
}

impl RawSnapshot {
    fn into_snapshot(self) -> DeviceSnapshot {
        let last_synced_at = self.last_synced_at;
        let todos = self
            .todos
            .into_iter()
            .map(|(local_id, raw)| {
                let todo = LocalTodo {
                    fields: raw.fields,
                    // Records predating the edit-timestamp column carry no
                    // editedAt; the sync cursor is the best lower bound.
                    edited_at: raw.edited_at.unwrap_or(last_synced_at),
                };
                (local_id, todo)
            })
            .collect();
        DeviceSnapshot {
            last_synced_at,
            todos,
            server_id_to_local_id: self.server_id_to_local_id,
            dirty: self.dirty,
        }
    }
}

/// Loads and persists [`DeviceSnapshot`] documents.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or a fresh default when no file exists yet.
    ///
    /// An existing but undecodable file fails with
    /// [`Error::CorruptState`].
    pub fn load(&self) -> Result<DeviceSnapshot> {
        if !self.path.exists() {
            return Ok(DeviceSnapshot::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        let raw: RawSnapshot = serde_json::from_str(&contents).map_err(|error| {
            Error::CorruptState(format!(
                "cannot decode {}: {error}",
                self.path.display()
            ))
        })?;
        Ok(raw.into_snapshot())
    }

    /// Copy the live file to its `.bak` sidecar. No-op when no snapshot
    /// has been written yet.
    pub fn backup(&self) -> Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }
        Ok(())
    }

    /// Atomically replace the snapshot: write a sibling temp file, fsync,
    /// rename over the target.
    pub fn persist(&self, snapshot: &DeviceSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.temp_path();
        let payload = serde_json::to_vec_pretty(snapshot)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".bak")
    }

    fn temp_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, &format!(".tmp-{}", std::process::id()))
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    name.push_str(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TodoStatus;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::new(dir.path().join("state.json"))
    }

    fn sample_snapshot() -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot {
            last_synced_at: "2026-01-03T12:00:00Z".parse().unwrap(),
            ..Default::default()
        };
        snapshot.todos.insert(
            "l1".to_string(),
            LocalTodo {
                fields: TodoFields {
                    title: "Water plants".to_string(),
                    status: TodoStatus::Open,
                    ..Default::default()
                },
                edited_at: "2026-01-03T11:59:00Z".parse().unwrap(),
            },
        );
        snapshot
            .server_id_to_local_id
            .insert("s1".to_string(), "l1".to_string());
        snapshot
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let snapshot = store(&dir).load().unwrap();
        assert_eq!(snapshot, DeviceSnapshot::default());
        assert_eq!(snapshot.last_synced_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snapshot = sample_snapshot();
        store.persist(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn persist_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.persist(&sample_snapshot()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "found {leftovers:?}");
    }

    #[test]
    fn undecodable_file_is_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{ not json").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }

    #[test]
    fn missing_required_field_is_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        // No serverIdToLocalId map.
        fs::write(
            store.path(),
            r#"{ "lastSyncedAt": "2026-01-03T12:00:00Z", "todos": {} }"#,
        )
        .unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }

    #[test]
    fn old_records_default_position_and_edited_at() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        // A snapshot written before `position` and `editedAt` existed.
        fs::write(
            store.path(),
            r#"{
                "lastSyncedAt": "2026-01-03T12:00:00Z",
                "todos": {
                    "l1": { "title": "Old record", "notes": "", "dueDate": null,
                            "tags": [], "status": "open" }
                },
                "serverIdToLocalId": { "s1": "l1" }
            }"#,
        )
        .unwrap();
        let snapshot = store.load().unwrap();
        let todo = &snapshot.todos["l1"];
        assert_eq!(todo.fields.position, 0);
        assert_eq!(todo.edited_at, snapshot.last_synced_at);
    }

    #[test]
    fn backup_copies_live_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.persist(&sample_snapshot()).unwrap();
        store.backup().unwrap();
        assert!(store.backup_path().exists());
        let live = fs::read_to_string(store.path()).unwrap();
        let bak = fs::read_to_string(store.backup_path()).unwrap();
        assert_eq!(live, bak);
    }

    #[test]
    fn backup_without_live_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.backup().unwrap();
        assert!(!store.backup_path().exists());
    }
}
