//! herd-core - Core library for Herd
//!
//! This crate contains the device-side synchronization engine, the shared
//! todo data model, and the wire protocol types spoken between devices and
//! the coordination server. The server (`herd-api`) and the CLI
//! (`herd-cli`) both build on it.

pub mod apply;
pub mod conflict_log;
pub mod detect;
pub mod engine;
pub mod error;
pub mod lock;
pub mod models;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod snapshot;
pub mod transport;
pub mod util;

pub use engine::{CycleOutcome, CycleReport, SyncEngine};
pub use error::{Error, Result};
pub use models::{Todo, TodoFields, TodoStatus};
pub use provider::{ProviderTodo, TaskProvider};
pub use snapshot::{DeviceSnapshot, LocalTodo, SnapshotStore};
