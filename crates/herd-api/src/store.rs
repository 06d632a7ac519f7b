//! Transactional todo store: todos, tombstones, and the push merge.
//!
//! A push is one SQLite transaction; either every accepted mutation
//! lands or none do. Conflicts are data in the response, never errors.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use herd_core::models::{Todo, TodoFields, TodoStatus};
use herd_core::protocol::{
    Conflict, ConflictReason, DeltaResponse, DeltaTodos, IdMapping, PushDeletion, PushRequest,
    PushResponse, PushUpsert, ResetCounts, ResetResponse, StateBody, TombstoneEntry,
};
use uuid::Uuid;

use crate::db::Database;
use crate::error::ApiError;
use crate::merge::incoming_wins;

/// Server-side todo + tombstone store.
pub struct TodoStore {
    db: Database,
}

struct StoredTombstone {
    deleted_at: DateTime<Utc>,
    deleted_by: String,
}

impl TodoStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, ApiError> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.db.connection()
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        self.db.connection_mut()
    }

    /// All todos plus a fresh cursor; the first-sync bootstrap answer.
    pub fn state(&self) -> Result<StateBody, ApiError> {
        let mut stmt = self.db.connection().prepare(
            "SELECT id, title, notes, due_date, tags, status, position,
                    edited_at_ms, updated_at_ms, created_by, updated_by
             FROM todos
             ORDER BY position ASC, id ASC",
        )?;
        let todos = stmt
            .query_map([], parse_todo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(StateBody {
            todos,
            synced_at: Utc::now(),
        })
    }

    /// Incremental changes since a client cursor.
    ///
    /// Todos filter on `updatedAt`, tombstones on `recordedAt`; both are
    /// server clocks, so backdated client deletions still propagate.
    pub fn delta(&self, since: DateTime<Utc>) -> Result<DeltaResponse, ApiError> {
        let since_ms = since.timestamp_millis();

        let mut stmt = self.db.connection().prepare(
            "SELECT id, title, notes, due_date, tags, status, position,
                    edited_at_ms, updated_at_ms, created_by, updated_by
             FROM todos
             WHERE updated_at_ms > ?
             ORDER BY updated_at_ms ASC",
        )?;
        let upserted = stmt
            .query_map(params![since_ms], parse_todo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.db.connection().prepare(
            "SELECT server_id, deleted_at_ms
             FROM tombstones
             WHERE recorded_at_ms > ?
             ORDER BY recorded_at_ms ASC",
        )?;
        let deleted = stmt
            .query_map(params![since_ms], |row| {
                Ok(TombstoneEntry {
                    server_id: row.get(0)?,
                    deleted_at: datetime_from_ms(row.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DeltaResponse {
            todos: DeltaTodos { upserted, deleted },
            synced_at: Utc::now(),
        })
    }

    /// Merge one batched push inside a single transaction.
    pub fn apply_push(
        &mut self,
        user_id: &str,
        request: &PushRequest,
    ) -> Result<PushResponse, ApiError> {
        let now = Utc::now();
        let mut conflicts = Vec::new();
        let mut mappings = Vec::new();

        let tx = self.db.connection_mut().transaction()?;
        for upsert in &request.todos.upserted {
            apply_upsert(&tx, user_id, upsert, now, &mut conflicts, &mut mappings)?;
        }
        for deletion in &request.todos.deleted {
            apply_deletion(&tx, user_id, deletion, now, &mut conflicts)?;
        }
        tx.commit()?;

        if !conflicts.is_empty() {
            tracing::info!(
                user = user_id,
                count = conflicts.len(),
                "push merged with conflicts"
            );
        }

        Ok(PushResponse {
            state: self.state()?,
            conflicts,
            mappings,
        })
    }

    /// Wipe every todo and tombstone.
    pub fn reset(&mut self) -> Result<ResetResponse, ApiError> {
        let tx = self.db.connection_mut().transaction()?;
        let todos = tx.execute("DELETE FROM todos", [])?;
        tx.execute("DELETE FROM tombstones", [])?;
        tx.commit()?;
        Ok(ResetResponse {
            success: true,
            deleted: ResetCounts {
                todos: todos as u64,
            },
        })
    }
}

fn apply_upsert(
    conn: &Connection,
    user_id: &str,
    upsert: &PushUpsert,
    now: DateTime<Utc>,
    conflicts: &mut Vec<Conflict>,
    mappings: &mut Vec<IdMapping>,
) -> Result<(), ApiError> {
    let (server_id, fresh) = match &upsert.server_id {
        Some(id) => (id.clone(), false),
        None => (Uuid::new_v4().to_string(), true),
    };

    if let Some(tombstone) = get_tombstone(conn, &server_id)? {
        if incoming_wins(
            upsert.edited_at,
            user_id,
            tombstone.deleted_at,
            &tombstone.deleted_by,
        ) {
            // Resurrection: the edit postdates the deletion.
            conn.execute("DELETE FROM tombstones WHERE server_id = ?", [&server_id])?;
        } else {
            conflicts.push(Conflict {
                server_id,
                reason: ConflictReason::RemoteDeleteNewer,
                server_todo: None,
                client_todo: Some(upsert.clone()),
                client_deleted_at: None,
            });
            return Ok(());
        }
    }

    match get_todo(conn, &server_id)? {
        None => {
            insert_todo(conn, &server_id, upsert, user_id, now)?;
            if fresh {
                if let Some(client_id) = &upsert.client_id {
                    mappings.push(IdMapping {
                        server_id,
                        client_id: client_id.clone(),
                    });
                }
            }
        }
        Some(stored) => {
            if is_replay(&stored, upsert, user_id) {
                return Ok(());
            }
            if incoming_wins(upsert.edited_at, user_id, stored.edited_at, &stored.updated_by) {
                overwrite_todo(conn, &server_id, upsert, user_id, now)?;
            } else {
                conflicts.push(Conflict {
                    server_id,
                    reason: ConflictReason::RemoteEditNewer,
                    server_todo: Some(stored),
                    client_todo: Some(upsert.clone()),
                    client_deleted_at: None,
                });
            }
        }
    }
    Ok(())
}

/// An upsert that merely echoes the stored version (same author, same
/// instant, same content) is a replayed push, not a losing edit.
fn is_replay(stored: &Todo, upsert: &PushUpsert, user_id: &str) -> bool {
    stored.edited_at == upsert.edited_at
        && stored.updated_by == user_id
        && stored.fields.content_eq(&upsert.fields)
}

fn apply_deletion(
    conn: &Connection,
    user_id: &str,
    deletion: &PushDeletion,
    now: DateTime<Utc>,
    conflicts: &mut Vec<Conflict>,
) -> Result<(), ApiError> {
    let server_id = &deletion.server_id;
    match get_todo(conn, server_id)? {
        None => {
            // Only the newest deletion per id is retained.
            let keep = match get_tombstone(conn, server_id)? {
                Some(existing) => deletion.deleted_at > existing.deleted_at,
                None => true,
            };
            if keep {
                upsert_tombstone(conn, server_id, deletion.deleted_at, user_id, now)?;
            }
        }
        Some(stored) => {
            if incoming_wins(
                deletion.deleted_at,
                user_id,
                stored.edited_at,
                &stored.updated_by,
            ) {
                conn.execute("DELETE FROM todos WHERE id = ?", [server_id])?;
                upsert_tombstone(conn, server_id, deletion.deleted_at, user_id, now)?;
            } else {
                conflicts.push(Conflict {
                    server_id: server_id.clone(),
                    reason: ConflictReason::RemoteEditNewer,
                    server_todo: Some(stored),
                    client_todo: None,
                    client_deleted_at: Some(deletion.deleted_at),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row plumbing
// ---------------------------------------------------------------------------

fn get_todo(conn: &Connection, server_id: &str) -> Result<Option<Todo>, ApiError> {
    let todo = conn
        .query_row(
            "SELECT id, title, notes, due_date, tags, status, position,
                    edited_at_ms, updated_at_ms, created_by, updated_by
             FROM todos WHERE id = ?",
            [server_id],
            parse_todo,
        )
        .optional()?;
    Ok(todo)
}

fn get_tombstone(conn: &Connection, server_id: &str) -> Result<Option<StoredTombstone>, ApiError> {
    let tombstone = conn
        .query_row(
            "SELECT deleted_at_ms, deleted_by FROM tombstones WHERE server_id = ?",
            [server_id],
            |row| {
                Ok(StoredTombstone {
                    deleted_at: datetime_from_ms(row.get(0)?),
                    deleted_by: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(tombstone)
}

fn insert_todo(
    conn: &Connection,
    server_id: &str,
    upsert: &PushUpsert,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    conn.execute(
        "INSERT INTO todos (id, title, notes, due_date, tags, status, position,
                            edited_at_ms, updated_at_ms, created_by, updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            server_id,
            upsert.fields.title,
            upsert.fields.notes,
            upsert.fields.due_date.map(|date| date.to_string()),
            serde_json::to_string(&upsert.fields.tags)?,
            upsert.fields.status.to_string(),
            upsert.fields.position,
            upsert.edited_at.timestamp_millis(),
            now.timestamp_millis(),
            user_id,
            user_id,
        ],
    )?;
    Ok(())
}

fn overwrite_todo(
    conn: &Connection,
    server_id: &str,
    upsert: &PushUpsert,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    conn.execute(
        "UPDATE todos
         SET title = ?, notes = ?, due_date = ?, tags = ?, status = ?, position = ?,
             edited_at_ms = ?, updated_at_ms = ?, updated_by = ?
         WHERE id = ?",
        params![
            upsert.fields.title,
            upsert.fields.notes,
            upsert.fields.due_date.map(|date| date.to_string()),
            serde_json::to_string(&upsert.fields.tags)?,
            upsert.fields.status.to_string(),
            upsert.fields.position,
            upsert.edited_at.timestamp_millis(),
            now.timestamp_millis(),
            user_id,
            server_id,
        ],
    )?;
    Ok(())
}

fn upsert_tombstone(
    conn: &Connection,
    server_id: &str,
    deleted_at: DateTime<Utc>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    conn.execute(
        "INSERT OR REPLACE INTO tombstones (server_id, deleted_at_ms, recorded_at_ms, deleted_by)
         VALUES (?, ?, ?, ?)",
        params![
            server_id,
            deleted_at.timestamp_millis(),
            now.timestamp_millis(),
            user_id,
        ],
    )?;
    Ok(())
}

fn parse_todo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Todo> {
    let due_date: Option<String> = row.get(3)?;
    let tags: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(Todo {
        id: row.get(0)?,
        fields: TodoFields {
            title: row.get(1)?,
            notes: row.get(2)?,
            due_date: due_date.and_then(|raw| raw.parse().ok()),
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            status: status.parse().unwrap_or(TodoStatus::Open),
            position: row.get(6)?,
        },
        edited_at: datetime_from_ms(row.get(7)?),
        updated_at: datetime_from_ms(row.get(8)?),
        created_by: row.get(9)?,
        updated_by: row.get(10)?,
    })
}

fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}
