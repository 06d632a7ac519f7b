//! Client configuration resolved from flags and environment.

use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::CliError;

/// Everything a device needs to sync.
#[derive(Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub token: String,
    pub project: String,
    pub state_dir: PathBuf,
    pub host_file: PathBuf,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("token", &"[REDACTED]")
            .field("project", &self.project)
            .field("state_dir", &self.state_dir)
            .field("host_file", &self.host_file)
            .finish()
    }
}

impl ClientConfig {
    /// Resolve config from the environment, with CLI flags taking
    /// precedence for paths.
    pub fn resolve(
        state_dir_flag: Option<PathBuf>,
        host_file_flag: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        Self::from_lookup(|name| env::var(name).ok(), state_dir_flag, host_file_flag)
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        state_dir_flag: Option<PathBuf>,
        host_file_flag: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let server_url = required(&lookup, "HERD_SERVER_URL")?;
        let token = required(&lookup, "HERD_TOKEN")?;
        let project = optional(&lookup, "HERD_PROJECT").unwrap_or_else(|| "inbox".to_string());

        let state_dir = state_dir_flag
            .or_else(|| optional(&lookup, "HERD_STATE_DIR").map(PathBuf::from))
            .unwrap_or_else(default_state_dir);
        let host_file = host_file_flag
            .or_else(|| optional(&lookup, "HERD_HOST_FILE").map(PathBuf::from))
            .unwrap_or_else(|| state_dir.join("todos.json"));

        Ok(Self {
            server_url,
            token,
            project,
            state_dir,
            host_file,
        })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn conflict_log_path(&self) -> PathBuf {
        self.state_dir.join("conflicts.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("sync.lock")
    }
}

/// State paths without requiring server credentials; enough for the
/// offline commands (`conflicts`, `doctor`).
pub fn resolve_state_dir(state_dir_flag: Option<PathBuf>) -> PathBuf {
    state_dir_flag
        .or_else(|| env::var_os("HERD_STATE_DIR").map(PathBuf::from))
        .unwrap_or_else(default_state_dir)
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("herd")
}

fn required(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<String, CliError> {
    optional(lookup, name)
        .ok_or_else(|| CliError::Config(format!("environment variable {name} is required")))
}

fn optional(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
