//! Change detection: diff the current host-app readout against the
//! snapshot and classify adds, edits, and deletes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::provider::ProviderTodo;
use crate::registry::IdRegistry;
use crate::snapshot::{DeviceSnapshot, LocalTodo};

/// Counts of what one detection pass classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    /// Pending deletions withdrawn because the item reappeared.
    pub withdrawn: usize,
}

impl ChangeSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Diff `readout` against `snapshot.todos`, updating the snapshot records
/// and the dirty set in place. Touched records are stamped with
/// `edited_at = now`.
///
/// `position` is the todo's ordinal in the readout; tag comparison is
/// order-insensitive.
pub fn detect_changes(
    snapshot: &mut DeviceSnapshot,
    registry: &IdRegistry,
    readout: &[ProviderTodo],
    now: DateTime<Utc>,
) -> ChangeSummary {
    let mut summary = ChangeSummary::default();

    let mut current: BTreeMap<&str, LocalTodo> = BTreeMap::new();
    for (ordinal, item) in readout.iter().enumerate() {
        current.insert(item.local_id.as_str(), item.to_local(ordinal as i64));
    }

    // Adds and edits.
    for (local_id, seen) in &current {
        match snapshot.todos.get(*local_id) {
            None => {
                let mut todo = seen.clone();
                todo.edited_at = now;
                snapshot.todos.insert((*local_id).to_string(), todo);
                snapshot.dirty.upserted.insert((*local_id).to_string());
                summary.added += 1;
            }
            Some(known) if !known.fields.content_eq(&seen.fields) => {
                let mut todo = seen.clone();
                todo.edited_at = now;
                snapshot.todos.insert((*local_id).to_string(), todo);
                snapshot.dirty.upserted.insert((*local_id).to_string());
                summary.modified += 1;
            }
            Some(_) => {}
        }
    }

    // Deletes: known locally, gone from the readout.
    let vanished: Vec<String> = snapshot
        .todos
        .keys()
        .filter(|local_id| !current.contains_key(local_id.as_str()))
        .cloned()
        .collect();
    for local_id in vanished {
        snapshot.todos.remove(&local_id);
        snapshot.dirty.upserted.remove(&local_id);
        if let Some(server_id) = registry.reverse(&local_id) {
            snapshot
                .dirty
                .deleted
                .entry(server_id.to_string())
                .or_insert(now);
        }
        summary.deleted += 1;
    }

    // Withdraw pending deletions whose item has reappeared in the host app.
    let withdrawn: Vec<String> = snapshot
        .dirty
        .deleted
        .keys()
        .filter(|server_id| {
            registry
                .get(server_id)
                .is_some_and(|local_id| current.contains_key(local_id))
        })
        .cloned()
        .collect();
    for server_id in &withdrawn {
        snapshot.dirty.deleted.remove(server_id);
        summary.withdrawn += 1;
    }

    summary
}
