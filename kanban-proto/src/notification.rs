//! Per-user notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{NotificationId, ProjectId, TaskId};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// The user was assigned to a task.
    TaskAssigned,
    /// Someone commented on a task the user is assigned to.
    TaskComment,
    /// The user was added to a project.
    ProjectInvite,
    /// A task the user is assigned to was edited.
    TaskUpdated,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskAssigned => f.write_str("task-assigned"),
            Self::TaskComment => f.write_str("task-comment"),
            Self::ProjectInvite => f.write_str("project-invite"),
            Self::TaskUpdated => f.write_str("task-updated"),
        }
    }
}

/// One entry of a user's inbox.
///
/// Only `read` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification identifier.
    pub id: NotificationId,
    /// Notification type.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Human-readable text.
    pub message: String,
    /// Related project, if any.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// Related task, if any.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Whether the user has seen it.
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unread notification stamped with the current time.
    #[must_use]
    pub fn new(
        kind: NotificationKind,
        message: impl Into<String>,
        project_id: Option<ProjectId>,
        task_id: Option<TaskId>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            kind,
            message: message.into(),
            project_id,
            task_id,
            read: false,
            created_at: Utc::now(),
        }
    }
}
