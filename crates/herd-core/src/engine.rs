//! The sync cycle: detect → push → pull → apply → persist.
//!
//! One cycle is the unit of crash safety. Nothing durable changes until
//! the snapshot persists at the end, so a cycle killed anywhere simply
//! re-runs; the change detector and the server's merge make the re-run
//! converge.

use std::path::PathBuf;

use chrono::Utc;

use crate::apply::apply_delta;
use crate::conflict_log::{ConflictLog, ConflictRecord};
use crate::detect::detect_changes;
use crate::error::Result;
use crate::lock::SyncLock;
use crate::protocol::{DeltaTodos, PushDeletion, PushRequest, PushTodos, PushUpsert};
use crate::provider::TaskProvider;
use crate::registry::IdRegistry;
use crate::snapshot::{DeviceSnapshot, DirtySet, SnapshotStore};
use crate::transport::Transport;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Another sync holds the device lock.
    Skipped,
}

/// Summary of one cycle, for logging and user notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub skipped: bool,
    pub detected_changes: usize,
    pub pushed_upserts: usize,
    pub pushed_deletions: usize,
    pub applied_upserts: usize,
    pub applied_deletions: usize,
    /// Conflict entries recorded this cycle.
    pub conflicts: usize,
}

impl CycleReport {
    #[must_use]
    pub fn outcome(&self) -> CycleOutcome {
        if self.skipped {
            CycleOutcome::Skipped
        } else {
            CycleOutcome::Completed
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Drives the full device-side synchronization cycle.
pub struct SyncEngine<P, T> {
    provider: P,
    transport: T,
    snapshot_store: SnapshotStore,
    conflict_log: ConflictLog,
    lock_path: PathBuf,
    project: String,
}

impl<P: TaskProvider, T: Transport> SyncEngine<P, T> {
    pub fn new(
        provider: P,
        transport: T,
        snapshot_store: SnapshotStore,
        conflict_log: ConflictLog,
        lock_path: impl Into<PathBuf>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            transport,
            snapshot_store,
            conflict_log,
            lock_path: lock_path.into(),
            project: project.into(),
        }
    }

    /// Run one cycle end to end.
    ///
    /// The device lock is held for the whole cycle and released on every
    /// exit path, error or not.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let Some(_lock) = SyncLock::acquire(&self.lock_path)? else {
            return Ok(CycleReport::skipped());
        };

        let mut snapshot = self.snapshot_store.load()?;
        self.snapshot_store.backup()?;
        let mut registry = IdRegistry::from_map(&snapshot.server_id_to_local_id)?;

        let readout = self.provider.list_todos(&self.project).await?;
        let now = Utc::now();
        let changes = detect_changes(&mut snapshot, &registry, &readout, now);
        if changes.total() > 0 {
            tracing::info!(
                added = changes.added,
                modified = changes.modified,
                deleted = changes.deleted,
                "detected local changes"
            );
        }

        let mut report = CycleReport {
            detected_changes: changes.total(),
            ..Default::default()
        };
        let mut log_entries: Vec<ConflictRecord> = Vec::new();

        let push = build_push(&snapshot, &registry);
        if !push.is_empty() {
            report.pushed_upserts = push.todos.upserted.len();
            report.pushed_deletions = push.todos.deleted.len();
            let response = self.transport.push(&push).await?;
            for mapping in &response.mappings {
                registry.bind(&mapping.server_id, &mapping.client_id, |local_id| {
                    snapshot.todos.contains_key(local_id)
                })?;
            }
            for conflict in &response.conflicts {
                tracing::warn!(server_id = %conflict.server_id, reason = %conflict.reason, "push conflict");
                log_entries.push(ConflictRecord::from_server(conflict, now));
            }
            snapshot.dirty = DirtySet::default();
        }

        let (delta, synced_at) = if is_bootstrap(&snapshot, &registry, readout.len()) {
            tracing::info!("empty device, bootstrapping from full state");
            let state = self.transport.state().await?;
            let delta = DeltaTodos {
                upserted: state.todos,
                deleted: Vec::new(),
            };
            (delta, state.synced_at)
        } else {
            let response = self.transport.delta(snapshot.last_synced_at).await?;
            (response.todos, response.synced_at)
        };

        let outcome = apply_delta(
            &self.provider,
            &self.project,
            &mut snapshot,
            &mut registry,
            &delta,
            now,
        )
        .await?;
        report.applied_upserts = outcome.created + outcome.updated;
        report.applied_deletions = delta.deleted.len();
        log_entries.extend(outcome.conflicts);
        report.conflicts = log_entries.len();

        self.conflict_log.append(&log_entries)?;
        snapshot.server_id_to_local_id = registry.into_map();
        snapshot.last_synced_at = synced_at;
        self.snapshot_store.persist(&snapshot)?;

        tracing::debug!(?report, "cycle complete");
        Ok(report)
    }
}

/// A device is bootstrapping when it has nothing at all: no snapshot
/// records, no mappings, and an empty host app.
fn is_bootstrap(snapshot: &DeviceSnapshot, registry: &IdRegistry, readout_len: usize) -> bool {
    snapshot.todos.is_empty() && registry.is_empty() && readout_len == 0
}

/// Build the push payload from the dirty set. Upserts carry the known
/// server id, or the local id as `clientId` for later binding.
fn build_push(snapshot: &DeviceSnapshot, registry: &IdRegistry) -> PushRequest {
    let mut upserted = Vec::new();
    for local_id in &snapshot.dirty.upserted {
        let Some(todo) = snapshot.todos.get(local_id) else {
            continue;
        };
        let server_id = registry.reverse(local_id).map(ToString::to_string);
        let client_id = if server_id.is_none() {
            Some(local_id.clone())
        } else {
            None
        };
        upserted.push(PushUpsert {
            server_id,
            client_id,
            fields: todo.fields.clone(),
            edited_at: todo.edited_at,
        });
    }

    let deleted = snapshot
        .dirty
        .deleted
        .iter()
        .map(|(server_id, deleted_at)| PushDeletion {
            server_id: server_id.clone(),
            deleted_at: *deleted_at,
        })
        .collect();

    PushRequest {
        todos: PushTodos { upserted, deleted },
        last_synced_at: snapshot.last_synced_at,
    }
}
