use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "herd")]
#[command(about = "Keep a shared todo list in step across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory for device state, lock, and conflict log
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Path to the host todo file mirrored by this device
    #[arg(long, global = true, value_name = "PATH")]
    pub host_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync cycle, or keep cycling with --daemon
    Sync {
        /// Keep syncing on a fixed interval until interrupted
        #[arg(long)]
        daemon: bool,
        /// Seconds between cycles in daemon mode
        #[arg(long, default_value = "30", value_name = "SECS")]
        interval: u64,
    },
    /// List recorded sync conflicts
    Conflicts {
        /// Number of entries to show, newest last
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the device state for mapping problems
    Doctor,
    /// Probe the coordination server
    Health,
    /// Wipe every todo and tombstone on the server
    Reset {
        /// Required confirmation
        #[arg(long)]
        force: bool,
    },
}
