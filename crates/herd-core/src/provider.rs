//! Host task application contract.
//!
//! The sync core only depends on this capability set; the concrete
//! adapter lives outside the core. Creates may be eventually consistent:
//! the adapter cannot return the new item's id, so the applier re-reads
//! and matches. There is no programmatic delete.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{TodoFields, TodoStatus};
use crate::snapshot::LocalTodo;

/// One todo as read out of the host application.
///
/// The readout order is meaningful: a todo's ordinal becomes its
/// `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTodo {
    /// Host-app-local identifier
    pub local_id: String,
    pub title: String,
    pub notes: String,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub status: TodoStatus,
}

impl ProviderTodo {
    /// Snapshot form of this readout entry at the given readout ordinal.
    /// The caller decides the `edited_at` stamp.
    #[must_use]
    pub fn to_local(&self, position: i64) -> LocalTodo {
        LocalTodo {
            fields: TodoFields {
                title: self.title.clone(),
                notes: self.notes.clone(),
                due_date: self.due_date,
                tags: self.tags.clone(),
                status: self.status,
                position,
            },
            edited_at: chrono::DateTime::UNIX_EPOCH,
        }
    }
}

/// Capability set of the host task application.
#[async_trait]
pub trait TaskProvider: Send + Sync {
    /// Current todos of the project, in display order.
    async fn list_todos(&self, project: &str) -> Result<Vec<ProviderTodo>>;

    /// Create a todo. The new item's id is not observable here; callers
    /// re-read and match by title against the prior readout.
    async fn create_todo(&self, project: &str, fields: &TodoFields) -> Result<()>;

    /// Update an existing todo's fields.
    async fn update_todo(&self, local_id: &str, fields: &TodoFields) -> Result<()>;
}
