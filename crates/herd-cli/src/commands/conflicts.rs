use std::path::Path;

use herd_core::conflict_log::{ConflictKind, ConflictLog, ConflictRecord};

use crate::error::CliError;

pub fn run_conflicts(state_dir: &Path, limit: usize, as_json: bool) -> Result<(), CliError> {
    let log = ConflictLog::new(state_dir.join("conflicts.json"));
    let all = log.read_all()?;
    let start = all.len().saturating_sub(limit);
    let shown = &all[start..];

    if as_json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for entry in shown {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &ConflictRecord) -> String {
    let kind = match entry.kind {
        ConflictKind::ServerRejectedEdit => "edit lost",
        ConflictKind::ServerRejectedDelete => "delete lost",
        ConflictKind::DeleteVsLocalEdit => "delete vs local edit",
        ConflictKind::DeleteAcknowledged => "remote delete",
    };
    let server_id = entry.server_id.as_deref().unwrap_or("-");
    format!(
        "{}  [{kind}]  {}  {}",
        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        server_id,
        entry.detail
    )
}
