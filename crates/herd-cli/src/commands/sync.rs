use std::time::Duration;

use herd_core::conflict_log::ConflictLog;
use herd_core::engine::{CycleOutcome, SyncEngine};
use herd_core::snapshot::SnapshotStore;
use herd_core::transport::HttpTransport;

use crate::config::ClientConfig;
use crate::error::CliError;
use crate::provider_file::FileProvider;

fn build_engine(config: &ClientConfig) -> Result<SyncEngine<FileProvider, HttpTransport>, CliError> {
    let provider = FileProvider::new(&config.host_file);
    let transport = HttpTransport::new(&config.server_url, &config.token)?;
    Ok(SyncEngine::new(
        provider,
        transport,
        SnapshotStore::new(config.snapshot_path()),
        ConflictLog::new(config.conflict_log_path()),
        config.lock_path(),
        &config.project,
    ))
}

/// Run one cycle and report to the user.
pub async fn run_sync_once(config: &ClientConfig) -> Result<(), CliError> {
    let engine = build_engine(config)?;
    let report = engine.run_cycle().await?;

    match report.outcome() {
        CycleOutcome::Skipped => {
            println!("Another sync is already running; skipped.");
        }
        CycleOutcome::Completed => {
            println!(
                "Sync completed: {} pushed, {} applied.",
                report.pushed_upserts + report.pushed_deletions,
                report.applied_upserts,
            );
            if report.conflicts > 0 {
                println!(
                    "{} conflict(s) resolved (your edits were older); run `herd conflicts` for details.",
                    report.conflicts
                );
            }
        }
    }
    Ok(())
}

/// Keep cycling on a fixed interval until interrupted.
pub async fn run_sync_daemon(config: &ClientConfig, interval_secs: u64) -> Result<(), CliError> {
    let engine = build_engine(config)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    tracing::info!(interval_secs, "sync daemon started");

    loop {
        ticker.tick().await;
        match engine.run_cycle().await {
            Ok(report) => {
                if report.outcome() == CycleOutcome::Skipped {
                    continue;
                }
                if report.conflicts > 0 {
                    tracing::warn!(
                        conflicts = report.conflicts,
                        "conflicts recorded; run `herd conflicts`"
                    );
                }
                tracing::debug!(?report, "cycle finished");
            }
            Err(error) => {
                let error = CliError::from(error);
                if error.is_fatal() {
                    eprintln!("Sync halted: {error}. Run `herd doctor`.");
                    return Err(error);
                }
                tracing::warn!(%error, "cycle failed, retrying next tick");
            }
        }
    }
}
