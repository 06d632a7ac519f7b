//! Remote applier: replays a server delta into the host application and
//! the snapshot.
//!
//! The server has already merged; every upsert in a delta is one the
//! remote side won. Creates are the awkward part: the host app cannot
//! return the new item's id, so the applier re-reads and matches the new
//! entry by exclusion and exact title.
//!
//! After change detection the snapshot mirrors the host readout, so
//! "does the item still exist on the device" is answered by the snapshot
//! throughout.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::conflict_log::{ConflictKind, ConflictRecord};
use crate::error::Result;
use crate::models::{Todo, TodoStatus};
use crate::protocol::{DeltaTodos, TombstoneEntry};
use crate::provider::TaskProvider;
use crate::registry::IdRegistry;
use crate::snapshot::{DeviceSnapshot, LocalTodo};

const CREATE_FIND_ATTEMPTS: u32 = 3;
const CREATE_FIND_BACKOFF: Duration = Duration::from_millis(500);

/// What one apply pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub created: usize,
    pub updated: usize,
    /// Creates that never became observable in the host app.
    pub orphaned: usize,
    pub conflicts: Vec<ConflictRecord>,
}

/// Apply a delta's upserts and tombstones.
pub async fn apply_delta(
    provider: &dyn TaskProvider,
    project: &str,
    snapshot: &mut DeviceSnapshot,
    registry: &mut IdRegistry,
    delta: &DeltaTodos,
    now: DateTime<Utc>,
) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();

    for remote in &delta.upserted {
        let mapped = registry
            .get(&remote.id)
            .map(ToString::to_string)
            .filter(|local_id| snapshot.todos.contains_key(local_id));
        match mapped {
            // Unknown here, or known but deleted on the device and
            // overruled by a newer remote edit: (re)create.
            None => apply_create(provider, project, snapshot, registry, remote, &mut outcome).await?,
            Some(local_id) => {
                provider.update_todo(&local_id, &remote.fields).await?;
                snapshot.todos.insert(
                    local_id,
                    LocalTodo {
                        fields: remote.fields.clone(),
                        edited_at: remote.edited_at,
                    },
                );
                outcome.updated += 1;
            }
        }
    }

    for tombstone in &delta.deleted {
        apply_tombstone(snapshot, registry, tombstone, now, &mut outcome);
    }

    Ok(outcome)
}

async fn apply_create(
    provider: &dyn TaskProvider,
    project: &str,
    snapshot: &mut DeviceSnapshot,
    registry: &mut IdRegistry,
    remote: &Todo,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    let before: HashSet<String> = provider
        .list_todos(project)
        .await?
        .into_iter()
        .map(|item| item.local_id)
        .collect();

    provider.create_todo(project, &remote.fields).await?;

    let Some(local_id) = find_created(provider, project, &before, &remote.fields.title).await?
    else {
        tracing::warn!(
            server_id = %remote.id,
            title = %remote.fields.title,
            "created item not observable in host app, leaving unmapped"
        );
        outcome.orphaned += 1;
        return Ok(());
    };

    registry.bind(&remote.id, &local_id, |candidate| {
        snapshot.todos.contains_key(candidate)
    })?;
    snapshot.todos.insert(
        local_id.clone(),
        LocalTodo {
            fields: remote.fields.clone(),
            edited_at: remote.edited_at,
        },
    );

    // The host-app create capability only takes open items; anything else
    // needs a follow-up update.
    if remote.fields.status != TodoStatus::Open {
        provider.update_todo(&local_id, &remote.fields).await?;
    }

    outcome.created += 1;
    Ok(())
}

/// Re-read the host app and find the entry that is new since `before` and
/// carries the expected title, with bounded retries for eventually
/// consistent adapters.
async fn find_created(
    provider: &dyn TaskProvider,
    project: &str,
    before: &HashSet<String>,
    title: &str,
) -> Result<Option<String>> {
    for attempt in 0..CREATE_FIND_ATTEMPTS {
        let candidates: Vec<String> = provider
            .list_todos(project)
            .await?
            .into_iter()
            .filter(|item| !before.contains(&item.local_id) && item.title == title)
            .map(|item| item.local_id)
            .collect();

        match candidates.len() {
            0 => {
                if attempt + 1 < CREATE_FIND_ATTEMPTS {
                    tokio::time::sleep(CREATE_FIND_BACKOFF).await;
                }
            }
            1 => return Ok(candidates.into_iter().next()),
            _ => {
                tracing::warn!(
                    title,
                    count = candidates.len(),
                    "ambiguous create match, binding first candidate"
                );
                return Ok(candidates.into_iter().next());
            }
        }
    }
    Ok(None)
}

fn apply_tombstone(
    snapshot: &mut DeviceSnapshot,
    registry: &mut IdRegistry,
    tombstone: &TombstoneEntry,
    now: DateTime<Utc>,
    outcome: &mut ApplyOutcome,
) {
    let Some(local_id) = registry.get(&tombstone.server_id).map(ToString::to_string) else {
        // Never knew the item; nothing to report.
        return;
    };

    let Some(local) = snapshot.todos.get(&local_id) else {
        // Already gone on the device too.
        registry.unbind(&tombstone.server_id);
        return;
    };

    if local.edited_at > tombstone.deleted_at {
        // The device edit postdates the deletion; the host app cannot be
        // auto-deleted, so the edit survives and will resurrect server-side.
        outcome.conflicts.push(ConflictRecord {
            recorded_at: now,
            kind: ConflictKind::DeleteVsLocalEdit,
            server_id: Some(tombstone.server_id.clone()),
            detail: format!(
                "remote deleted at {} but local edit at {} is newer",
                tombstone.deleted_at, local.edited_at,
            ),
        });
        return;
    }

    outcome.conflicts.push(ConflictRecord {
        recorded_at: now,
        kind: ConflictKind::DeleteAcknowledged,
        server_id: Some(tombstone.server_id.clone()),
        detail: format!(
            "remote deleted at {}; remove \"{}\" from the device to finish",
            tombstone.deleted_at, local.fields.title,
        ),
    });
}
