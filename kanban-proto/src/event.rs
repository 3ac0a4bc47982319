//! Real-time frames exchanged over the board WebSocket.
//!
//! Every frame is a JSON text message of the form
//! `{"type": "<kebab-case name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::board::TaskView;
use crate::ids::{ProjectId, TaskId, UserId};
use crate::notification::Notification;

/// A change that live clients should apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum BoardEvent {
    /// A task was created in a project.
    TaskCreated {
        /// Project the task belongs to.
        project_id: ProjectId,
        /// The new task.
        task: TaskView,
    },
    /// A task was edited, moved or commented on.
    TaskUpdated {
        /// Project the task belongs to.
        project_id: ProjectId,
        /// The task after the change.
        task: TaskView,
    },
    /// A task was deleted.
    TaskDeleted {
        /// Project the task belonged to.
        project_id: ProjectId,
        /// Id of the deleted task.
        task_id: TaskId,
    },
    /// A notification was added to a user's inbox.
    NotificationCreated {
        /// Recipient.
        user_id: UserId,
        /// The stored notification.
        notification: Notification,
    },
}

impl BoardEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task-created",
            Self::TaskUpdated { .. } => "task-updated",
            Self::TaskDeleted { .. } => "task-deleted",
            Self::NotificationCreated { .. } => "notification-created",
        }
    }

    /// Project room the event is scoped to, if it is a task event.
    #[must_use]
    pub const fn project_id(&self) -> Option<ProjectId> {
        match self {
            Self::TaskCreated { project_id, .. }
            | Self::TaskUpdated { project_id, .. }
            | Self::TaskDeleted { project_id, .. } => Some(*project_id),
            Self::NotificationCreated { .. } => None,
        }
    }
}

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Subscribe to a project's room.
    JoinProject {
        /// Project to join.
        project_id: ProjectId,
    },
    /// Unsubscribe from a project's room.
    LeaveProject {
        /// Project to leave.
        project_id: ProjectId,
    },
    /// Forward an event the client produced itself to the other members of
    /// the room (the sender does not get it back).
    Relay {
        /// The event to forward.
        event: BoardEvent,
    },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerFrame {
    /// Confirms a `join-project`.
    Joined {
        /// Joined project.
        project_id: ProjectId,
    },
    /// Confirms a `leave-project`.
    Left {
        /// Left project.
        project_id: ProjectId,
    },
    /// A board event.
    Event(BoardEvent),
    /// A request from this client could not be honoured.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}
