//! Todo model

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a todo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    #[default]
    Open,
    Completed,
    Canceled,
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown todo status: {other}")),
        }
    }
}

/// The mutable field set of a todo.
///
/// This is the unit of comparison for change detection and the payload of
/// every upsert; merges replace the whole set, never individual fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoFields {
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub position: i64,
}

impl TodoFields {
    /// Field-wise equality with order-insensitive tag comparison.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.notes == other.notes
            && self.due_date == other.due_date
            && self.status == other.status
            && self.position == other.position
            && tag_set(&self.tags) == tag_set(&other.tags)
    }
}

fn tag_set(tags: &[String]) -> HashSet<&str> {
    tags.iter().map(String::as_str).collect()
}

/// A todo as the coordination server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Server-assigned opaque identifier
    pub id: String,
    #[serde(flatten)]
    pub fields: TodoFields,
    /// Client-supplied timestamp of the mutation that produced this version
    pub edited_at: DateTime<Utc>,
    /// Server wall-clock timestamp of the most recent accepted write
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str, tags: &[&str]) -> TodoFields {
        TodoFields {
            title: title.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn content_eq_ignores_tag_order() {
        let a = fields("groceries", &["home", "errands"]);
        let b = fields("groceries", &["errands", "home"]);
        assert!(a.content_eq(&b));
    }

    #[test]
    fn content_eq_detects_tag_difference() {
        let a = fields("groceries", &["home"]);
        let b = fields("groceries", &["work"]);
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn content_eq_detects_position_difference() {
        let a = fields("groceries", &[]);
        let mut b = fields("groceries", &[]);
        b.position = 3;
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [TodoStatus::Open, TodoStatus::Completed, TodoStatus::Canceled] {
            let parsed: TodoStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TodoStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
    }

    #[test]
    fn empty_tags_serialize_as_empty_list() {
        let fields = TodoFields {
            title: "t".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["tags"], serde_json::json!([]));
        assert_eq!(json["dueDate"], serde_json::Value::Null);
    }
}
