//! Request bodies accepted by the REST API.
//!
//! Enumerated fields (`column`, `priority`, `role`) and `position` are kept
//! loosely typed so the server can reject bad values with a field-level
//! message instead of a blanket parse failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::board::Column;
use crate::ids::{ProjectId, UserId};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `POST /api/projects`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    /// Required project name.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional accent colour.
    #[serde(default)]
    pub color: Option<String>,
    /// Optional background.
    #[serde(default)]
    pub background: Option<String>,
}

/// `PUT /api/projects/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    /// New name; empty strings are ignored.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New colour; empty strings are ignored.
    #[serde(default)]
    pub color: Option<String>,
    /// New background.
    #[serde(default)]
    pub background: Option<String>,
}

/// `POST /api/projects/{id}/members`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    /// Email of the user to add.
    #[serde(default)]
    pub email: Option<String>,
    /// `admin` or `member` (default `member`).
    #[serde(default)]
    pub role: Option<String>,
}

/// `POST /api/tasks`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Required title.
    #[serde(default)]
    pub title: Option<String>,
    /// Required owning project.
    #[serde(default)]
    pub project: Option<ProjectId>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Target column (default `todo`).
    #[serde(default)]
    pub column: Option<String>,
    /// Priority (default `medium`).
    #[serde(default)]
    pub priority: Option<String>,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Initial assignees.
    #[serde(default)]
    pub assigned_to: Option<Vec<UserId>>,
}

/// `PUT /api/tasks/{id}`
///
/// Column and position are changed through the move endpoint only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<String>,
    /// New due date; an explicit `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// Replacement assignee list.
    #[serde(default)]
    pub assigned_to: Option<Vec<UserId>>,
}

/// `PUT /api/tasks/{id}/move`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveTaskRequest {
    /// Target column name.
    #[serde(default)]
    pub column: Option<String>,
    /// Target zero-based position; must be a non-negative integer.
    #[serde(default)]
    pub position: Option<serde_json::Value>,
}

impl MoveTaskRequest {
    /// Builds a well-formed move request.
    #[must_use]
    pub fn new(column: Column, position: u32) -> Self {
        Self {
            column: Some(column.as_str().to_string()),
            position: Some(serde_json::Value::from(position)),
        }
    }
}

/// `POST /api/tasks/{id}/comments`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentRequest {
    /// Comment body.
    #[serde(default)]
    pub text: Option<String>,
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field name as seen on the wire.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
