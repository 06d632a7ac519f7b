//! Device state diagnostics, mainly for `DuplicateMapping` halts.

use std::collections::BTreeMap;
use std::path::Path;

use herd_core::registry::IdRegistry;
use herd_core::snapshot::SnapshotStore;

use crate::error::CliError;

pub fn run_doctor(state_dir: &Path) -> Result<(), CliError> {
    let store = SnapshotStore::new(state_dir.join("state.json"));
    let snapshot = match store.load() {
        Ok(snapshot) => snapshot,
        Err(error) => {
            println!("Snapshot cannot be loaded: {error}");
            println!(
                "A backup may exist at {}.",
                store.backup_path().display()
            );
            return Ok(());
        }
    };

    println!(
        "Snapshot: {} todos, {} mappings, cursor {}",
        snapshot.todos.len(),
        snapshot.server_id_to_local_id.len(),
        snapshot.last_synced_at
    );
    if !snapshot.dirty.is_empty() {
        println!(
            "Pending: {} upsert(s), {} deletion(s) not yet pushed",
            snapshot.dirty.upserted.len(),
            snapshot.dirty.deleted.len()
        );
    }

    let duplicates = duplicate_locals(&snapshot.server_id_to_local_id);
    if duplicates.is_empty() {
        match IdRegistry::from_map(&snapshot.server_id_to_local_id) {
            Ok(_) => println!("Id registry is a clean bijection."),
            Err(error) => println!("Registry problem: {error}"),
        }
    } else {
        println!("Duplicate mapping candidates:");
        for (local_id, server_ids) in duplicates {
            println!("  local {local_id} <- servers {}", server_ids.join(", "));
        }
        println!("Remove the stale entries from the state file, or reset the device state.");
    }

    let dangling: Vec<&String> = snapshot
        .server_id_to_local_id
        .iter()
        .filter(|(_, local_id)| !snapshot.todos.contains_key(*local_id))
        .map(|(server_id, _)| server_id)
        .collect();
    if !dangling.is_empty() {
        println!(
            "{} mapping(s) point at locally deleted items (normal while a deletion is in flight).",
            dangling.len()
        );
    }

    Ok(())
}

/// Local ids referenced by more than one server id.
fn duplicate_locals(map: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    let mut by_local: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (server_id, local_id) in map {
        by_local
            .entry(local_id.clone())
            .or_default()
            .push(server_id.clone());
    }
    by_local
        .into_iter()
        .filter(|(_, server_ids)| server_ids.len() > 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_locals_finds_collisions() {
        let mut map = BTreeMap::new();
        map.insert("s1".to_string(), "l1".to_string());
        map.insert("s2".to_string(), "l1".to_string());
        map.insert("s3".to_string(), "l2".to_string());

        let duplicates = duplicate_locals(&map);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates["l1"], vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn clean_map_has_no_duplicates() {
        let mut map = BTreeMap::new();
        map.insert("s1".to_string(), "l1".to_string());
        map.insert("s2".to_string(), "l2".to_string());
        assert!(duplicate_locals(&map).is_empty());
    }
}
