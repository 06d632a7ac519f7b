//! JSON-file host application.
//!
//! Stands in for the real task app behind the provider contract: a flat
//! JSON array of todos that the user (or another tool) edits freely.
//! Matches the adapter's limitations on purpose: creates don't return
//! the new id, and the sync core never deletes entries.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herd_core::error::{Error, Result};
use herd_core::models::{TodoFields, TodoStatus};
use herd_core::provider::{ProviderTodo, TaskProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileTodo {
    id: String,
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    status: TodoStatus,
}

/// Host app backed by one JSON document.
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<FileTodo>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|error| Error::HostApp(format!("cannot decode {}: {error}", self.path.display())))
    }

    fn write(&self, todos: &[FileTodo]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self
            .path
            .with_extension(format!("tmp-{}", std::process::id()));
        fs::write(&temp, serde_json::to_vec_pretty(todos)?)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl TaskProvider for FileProvider {
    async fn list_todos(&self, _project: &str) -> Result<Vec<ProviderTodo>> {
        let todos = self.read()?;
        Ok(todos
            .into_iter()
            .map(|todo| ProviderTodo {
                local_id: todo.id,
                title: todo.title,
                notes: todo.notes,
                due_date: todo.due_date,
                tags: todo.tags,
                status: todo.status,
            })
            .collect())
    }

    async fn create_todo(&self, _project: &str, fields: &TodoFields) -> Result<()> {
        let mut todos = self.read()?;
        todos.push(FileTodo {
            id: Uuid::new_v4().to_string(),
            title: fields.title.clone(),
            notes: fields.notes.clone(),
            due_date: fields.due_date,
            tags: fields.tags.clone(),
            status: TodoStatus::Open,
        });
        self.write(&todos)
    }

    async fn update_todo(&self, local_id: &str, fields: &TodoFields) -> Result<()> {
        let mut todos = self.read()?;
        let todo = todos
            .iter_mut()
            .find(|todo| todo.id == local_id)
            .ok_or_else(|| Error::HostApp(format!("no todo with id {local_id}")))?;
        todo.title = fields.title.clone();
        todo.notes = fields.notes.clone();
        todo.due_date = fields.due_date;
        todo.tags = fields.tags.clone();
        todo.status = fields.status;
        self.write(&todos)
    }
}
