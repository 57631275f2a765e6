use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OwnerId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(Priority::Low),
            "MEDIUM" => Some(Priority::Medium),
            "HIGH" => Some(Priority::High),
            _ => None,
        }
    }
}

/// The synchronized unit.
///
/// `last_modified` is the only signal conflict resolution looks at, so every
/// mutation goes through a method that bumps it. Deleting sets `deleted`
/// instead of removing the record, which lets the tombstone reach other devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub tag: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
}

impl Task {
    pub fn new(owner_id: OwnerId, req: NewTaskRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            owner_id,
            title: req.title,
            description: req.description,
            due_at: req.due_at,
            priority: req.priority,
            completed: false,
            tag: req.tag,
            last_modified: now,
            deleted: false,
        }
    }

    pub fn apply_update(&mut self, req: UpdateTaskRequest, now: DateTime<Utc>) {
        if let Some(title) = req.title {
            self.title = title;
        }
        if let Some(description) = req.description {
            self.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(due_at) = req.due_at {
            self.due_at = due_at;
        }
        if let Some(priority) = req.priority {
            self.priority = Some(priority);
        }
        if let Some(tag) = req.tag {
            self.tag = tag;
        }
        self.touch(now);
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.touch(now);
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted = true;
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
    }
}
