//! Board data model: projects, tasks, columns and their display views.
//!
//! Within one `(project, column)` pair, task positions always form the
//! contiguous range `0..n`. The server maintains that invariant; the types
//! here only carry the values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CommentId, ProjectId, TaskId, UserId};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Maximum allowed project name length in characters.
pub const MAX_PROJECT_NAME_LENGTH: usize = 128;

/// Maximum allowed comment length in characters.
pub const MAX_COMMENT_LENGTH: usize = 4096;

/// Colour given to projects created without one.
pub const DEFAULT_PROJECT_COLOR: &str = "#6366f1";

/// One of the three fixed kanban lanes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    /// Not started.
    #[default]
    Todo,
    /// In progress.
    Doing,
    /// Finished.
    Done,
}

impl Column {
    /// All columns in board order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::Doing, Self::Done];

    /// Wire name of the column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            _ => Err(format!("invalid column: {s}")),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("invalid priority: {s}")),
        }
    }
}

/// A comment left on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment identifier.
    pub id: CommentId,
    /// Author of the comment.
    pub user: UserId,
    /// Comment body.
    pub text: String,
    /// When the comment was posted.
    pub created_at: DateTime<Utc>,
}

/// A file reference attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Original file name.
    pub filename: String,
    /// Where the file can be fetched from.
    pub url: String,
    /// When the file was attached.
    pub uploaded_at: DateTime<Utc>,
}

/// A task as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning project.
    pub project: ProjectId,
    /// Lane the task currently sits in.
    pub column: Column,
    /// Priority.
    pub priority: Priority,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Assigned users.
    #[serde(default)]
    pub assigned_to: Vec<UserId>,
    /// Zero-based rank within `(project, column)`.
    pub position: u32,
    /// Comments in posting order.
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// User who created the task.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Role of a project member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May manage the project and its members.
    Admin,
    /// May work on tasks.
    #[default]
    Member,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// A user's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The member.
    pub user: UserId,
    /// Role within the project.
    pub role: Role,
    /// When the user joined.
    pub joined_at: DateTime<Utc>,
}

/// A project board.
///
/// The owner is implicitly an admin and is not listed in `members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Accent colour, e.g. `#6366f1`.
    pub color: String,
    /// Optional background (image URL or CSS value).
    #[serde(default)]
    pub background: String,
    /// Owning user.
    pub owner: UserId,
    /// Members in join order.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether `user` may view and work on this project.
    #[must_use]
    pub fn has_access(&self, user: UserId) -> bool {
        self.owner == user || self.members.iter().any(|m| m.user == user)
    }

    /// Whether `user` may manage this project (owner or admin member).
    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.owner == user
            || self
                .members
                .iter()
                .any(|m| m.user == user && m.role == Role::Admin)
    }
}

/// Public profile of a user, used wherever a reference is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl UserSummary {
    /// Summary used when a referenced user is not known to the server.
    #[must_use]
    pub const fn unknown(id: UserId) -> Self {
        Self {
            id,
            name: String::new(),
            email: String::new(),
        }
    }
}

/// A comment with its author resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    /// Comment identifier.
    pub id: CommentId,
    /// Author profile.
    pub user: UserSummary,
    /// Comment body.
    pub text: String,
    /// When the comment was posted.
    pub created_at: DateTime<Utc>,
}

/// A task with every user reference resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    /// Task identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Owning project.
    pub project: ProjectId,
    /// Lane the task sits in.
    pub column: Column,
    /// Priority.
    pub priority: Priority,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Assigned users.
    pub assigned_to: Vec<UserSummary>,
    /// Zero-based rank within `(project, column)`.
    pub position: u32,
    /// Comments in posting order.
    pub comments: Vec<CommentView>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Creator profile.
    pub created_by: UserSummary,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A project with owner and members resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    /// Project identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Accent colour.
    pub color: String,
    /// Background.
    pub background: String,
    /// Owner profile.
    pub owner: UserSummary,
    /// Members with resolved profiles.
    pub members: Vec<MemberView>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A membership with its user resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    /// Member profile.
    pub user: UserSummary,
    /// Role within the project.
    pub role: Role,
    /// When the user joined.
    pub joined_at: DateTime<Utc>,
}
