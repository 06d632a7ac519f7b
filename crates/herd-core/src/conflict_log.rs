//! Append-only conflict log.
//!
//! Every merge loss reported by the server and every delete-vs-local-edit
//! standoff ends up here, stamped with a device-local timestamp. The file
//! is replaced via temp-and-rename so concurrent readers never see a
//! partial document.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{Conflict, ConflictReason};

/// What kind of standoff was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    /// The server kept a newer edit over ours.
    ServerRejectedEdit,
    /// The server kept a newer deletion over our edit.
    ServerRejectedDelete,
    /// A remote deletion arrived for an item we edited afterwards; the
    /// host app cannot be auto-deleted, so the edit stands locally.
    DeleteVsLocalEdit,
    /// A remote deletion arrived and nothing local contradicts it;
    /// device-side removal is left to the user.
    DeleteAcknowledged,
}

/// One conflict log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Device-local timestamp of the recording.
    pub recorded_at: DateTime<Utc>,
    pub kind: ConflictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Human-readable context (titles, timestamps).
    pub detail: String,
}

impl ConflictRecord {
    /// Entry for a rejection returned in a push response.
    #[must_use]
    pub fn from_server(conflict: &Conflict, recorded_at: DateTime<Utc>) -> Self {
        let kind = match conflict.reason {
            ConflictReason::RemoteEditNewer => {
                if conflict.client_deleted_at.is_some() {
                    ConflictKind::ServerRejectedDelete
                } else {
                    ConflictKind::ServerRejectedEdit
                }
            }
            ConflictReason::RemoteDeleteNewer => ConflictKind::ServerRejectedDelete,
        };
        let detail = match &conflict.server_todo {
            Some(todo) => format!(
                "{}; server kept \"{}\" (edited {})",
                conflict.reason, todo.fields.title, todo.edited_at
            ),
            None => conflict.reason.to_string(),
        };
        Self {
            recorded_at,
            kind,
            server_id: Some(conflict.server_id.clone()),
            detail,
        }
    }
}

/// The append-only `conflicts.json` document.
pub struct ConflictLog {
    path: PathBuf,
}

impl ConflictLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append entries to the log, preserving everything already there.
    pub fn append(&self, entries: &[ConflictRecord]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut all = self.read_all()?;
        all.extend_from_slice(entries);
        self.replace(&all)
    }

    /// All recorded entries, oldest first.
    pub fn read_all(&self) -> Result<Vec<ConflictRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|error| {
            Error::CorruptState(format!(
                "cannot decode conflict log {}: {error}",
                self.path.display()
            ))
        })
    }

    fn replace(&self, entries: &[ConflictRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self
            .path
            .with_extension(format!("tmp-{}", std::process::id()));
        let payload = serde_json::to_vec_pretty(entries)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
