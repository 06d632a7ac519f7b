//! Wire protocol between devices and the coordination server.
//!
//! All bodies are JSON; all timestamps are ISO-8601 UTC instants. The field
//! names here are the protocol, shared by the client transport and the
//! server routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Todo, TodoFields};

/// One upserted todo inside a push.
///
/// Carries `serverId` when the device already knows the server identity,
/// otherwise a `clientId` (the device-local id) the server echoes back in
/// its mapping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushUpsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(flatten)]
    pub fields: TodoFields,
    pub edited_at: DateTime<Utc>,
}

/// One deletion inside a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDeletion {
    pub server_id: String,
    pub deleted_at: DateTime<Utc>,
}

/// The mutation sets of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTodos {
    #[serde(default)]
    pub upserted: Vec<PushUpsert>,
    #[serde(default)]
    pub deleted: Vec<PushDeletion>,
}

/// Body of `POST /push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub todos: PushTodos,
    pub last_synced_at: DateTime<Utc>,
}

impl PushRequest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.todos.upserted.is_empty() && self.todos.deleted.is_empty()
    }
}

/// Why the server kept its own version over the client's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    #[serde(rename = "Remote edit was newer")]
    RemoteEditNewer,
    #[serde(rename = "Remote delete was newer")]
    RemoteDeleteNewer,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::RemoteEditNewer => "Remote edit was newer",
            Self::RemoteDeleteNewer => "Remote delete was newer",
        };
        write!(f, "{text}")
    }
}

/// One rejected mutation in a push response. Conflicts are data, not
/// errors; the push itself still answers 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub server_id: String,
    pub reason: ConflictReason,
    pub server_todo: Option<Todo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_todo: Option<PushUpsert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_deleted_at: Option<DateTime<Utc>>,
}

/// A `(serverId, clientId)` pair minted for a fresh create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    pub server_id: String,
    pub client_id: String,
}

/// Full-state body, shared by `GET /state` and the push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBody {
    pub todos: Vec<Todo>,
    pub synced_at: DateTime<Utc>,
}

/// Body of the push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub state: StateBody,
    pub conflicts: Vec<Conflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<IdMapping>,
}

/// A tombstone as served in a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstoneEntry {
    pub server_id: String,
    pub deleted_at: DateTime<Utc>,
}

/// Incremental change sets since a client cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaTodos {
    #[serde(default)]
    pub upserted: Vec<Todo>,
    #[serde(default)]
    pub deleted: Vec<TombstoneEntry>,
}

/// Body of `GET /delta?since=<ts>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaResponse {
    pub todos: DeltaTodos,
    pub synced_at: DateTime<Utc>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Body of `DELETE /reset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub deleted: ResetCounts,
}

/// Deletion counts reported by a reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCounts {
    pub todos: u64,
}

/// Error body served for 4xx/5xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}
