//! In-memory board store: users and their inboxes, projects, and tasks.
//!
//! All state sits behind one [`RwLock`]. Every mutation, including the
//! multi-task position shifts of a move or delete, happens under a single
//! write guard, so readers never observe a half-applied reorder.
//!
//! The store can be snapshotted to and restored from a JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use kanban_proto::board::{
    Column, CommentView, MemberView, Project, ProjectView, Task, TaskView, UserSummary,
};
use kanban_proto::ids::{NotificationId, ProjectId, TaskId, UserId};
use kanban_proto::notification::Notification;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::reorder::{self, MoveOutcome, ReorderError};

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No task with that id.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// No project with that id.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    /// No user with that id.
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    /// The notification is not in the user's inbox.
    #[error("notification not found: {0}")]
    NotificationNotFound(NotificationId),
    /// Failed to read or write the snapshot file.
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        /// File that was accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The snapshot file is not valid JSON for this schema.
    #[error("snapshot format: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl From<ReorderError> for StoreError {
    fn from(e: ReorderError) -> Self {
        match e {
            ReorderError::TaskNotFound(id) => Self::TaskNotFound(id),
        }
    }
}

/// A user known to the server, with their notification inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier (issued by the authentication layer).
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Notifications in arrival order.
    #[serde(default)]
    pub inbox: Vec<Notification>,
}

impl User {
    fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Known users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Projects.
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Tasks.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Default)]
struct BoardData {
    users: HashMap<UserId, User>,
    projects: HashMap<ProjectId, Project>,
    tasks: HashMap<TaskId, Task>,
}

impl BoardData {
    fn summary(&self, id: UserId) -> UserSummary {
        self.users
            .get(&id)
            .map_or_else(|| UserSummary::unknown(id), User::summary)
    }

    fn view_task(&self, task: &Task) -> TaskView {
        TaskView {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            project: task.project,
            column: task.column,
            priority: task.priority,
            due_date: task.due_date,
            assigned_to: task.assigned_to.iter().map(|u| self.summary(*u)).collect(),
            position: task.position,
            comments: task
                .comments
                .iter()
                .map(|c| CommentView {
                    id: c.id,
                    user: self.summary(c.user),
                    text: c.text.clone(),
                    created_at: c.created_at,
                })
                .collect(),
            attachments: task.attachments.clone(),
            created_by: self.summary(task.created_by),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }

    fn view_project(&self, project: &Project) -> ProjectView {
        ProjectView {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            color: project.color.clone(),
            background: project.background.clone(),
            owner: self.summary(project.owner),
            members: project
                .members
                .iter()
                .map(|m| MemberView {
                    user: self.summary(m.user),
                    role: m.role,
                    joined_at: m.joined_at,
                })
                .collect(),
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User, StoreError> {
        self.users.get_mut(&id).ok_or(StoreError::UserNotFound(id))
    }
}

/// The board store.
pub struct BoardStore {
    data: RwLock<BoardData>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BoardData::default()),
        }
    }

    /// Builds a store from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let data = BoardData {
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
            projects: snapshot.projects.into_iter().map(|p| (p.id, p)).collect(),
            tasks: snapshot.tasks.into_iter().map(|t| (t.id, t)).collect(),
        };
        Self {
            data: RwLock::new(data),
        }
    }

    /// Captures the current state.
    pub async fn snapshot(&self) -> Snapshot {
        let data = self.data.read().await;
        Snapshot {
            users: data.users.values().cloned().collect(),
            projects: data.projects.values().cloned().collect(),
            tasks: data.tasks.values().cloned().collect(),
        }
    }

    /// Loads a store from a snapshot file; a missing file yields an empty
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Snapshot`] if it cannot be parsed.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Self::from_snapshot(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes a snapshot to `path`, replacing it atomically via a temporary
    /// sibling file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.snapshot().await)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)
    }

    // --- users -----------------------------------------------------------

    /// Records or refreshes a user's profile, keeping their inbox.
    pub async fn upsert_user(&self, id: UserId, name: &str, email: &str) -> UserSummary {
        let mut data = self.data.write().await;
        let user = data.users.entry(id).or_insert_with(|| User {
            id,
            name: String::new(),
            email: String::new(),
            inbox: Vec::new(),
        });
        if !name.is_empty() {
            user.name = name.to_string();
        }
        if !email.is_empty() {
            user.email = email.to_string();
        }
        user.summary()
    }

    /// Profile of a user, if known.
    pub async fn user(&self, id: UserId) -> Option<UserSummary> {
        let data = self.data.read().await;
        data.users.get(&id).map(User::summary)
    }

    /// Finds a user by email, ignoring case.
    pub async fn find_user_by_email(&self, email: &str) -> Option<UserSummary> {
        let data = self.data.read().await;
        data.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(User::summary)
    }

    /// Users whose name or email contains `query` (case-insensitive),
    /// excluding `exclude`, sorted by name and capped at `limit`.
    pub async fn search_users(&self, query: &str, exclude: UserId, limit: usize) -> Vec<UserSummary> {
        let needle = query.to_lowercase();
        let data = self.data.read().await;
        let mut found: Vec<UserSummary> = data
            .users
            .values()
            .filter(|u| u.id != exclude)
            .filter(|u| {
                u.name.to_lowercase().contains(&needle) || u.email.to_lowercase().contains(&needle)
            })
            .map(User::summary)
            .collect();
        drop(data);
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found.truncate(limit);
        found
    }

    // --- projects --------------------------------------------------------

    /// Stores a new project.
    pub async fn insert_project(&self, project: Project) {
        let mut data = self.data.write().await;
        data.projects.insert(project.id, project);
    }

    /// Looks up a project.
    pub async fn project(&self, id: ProjectId) -> Option<Project> {
        let data = self.data.read().await;
        data.projects.get(&id).cloned()
    }

    /// Projects `user` owns or belongs to, most recently updated first.
    pub async fn projects_for(&self, user: UserId) -> Vec<Project> {
        let data = self.data.read().await;
        let mut projects: Vec<Project> = data
            .projects
            .values()
            .filter(|p| p.has_access(user))
            .cloned()
            .collect();
        drop(data);
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        projects
    }

    /// Applies `edit` to a project and bumps its `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] if the project is unknown.
    pub async fn update_project<F>(&self, id: ProjectId, edit: F) -> Result<Project, StoreError>
    where
        F: FnOnce(&mut Project),
    {
        let mut data = self.data.write().await;
        let project = data
            .projects
            .get_mut(&id)
            .ok_or(StoreError::ProjectNotFound(id))?;
        edit(project);
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    /// Deletes a project together with all of its tasks, returning how many
    /// tasks were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] if the project is unknown.
    pub async fn delete_project(&self, id: ProjectId) -> Result<usize, StoreError> {
        let mut data = self.data.write().await;
        data.projects
            .remove(&id)
            .ok_or(StoreError::ProjectNotFound(id))?;
        let before = data.tasks.len();
        data.tasks.retain(|_, t| t.project != id);
        Ok(before - data.tasks.len())
    }

    /// Resolves user references of a project for display.
    pub async fn view_project(&self, project: &Project) -> ProjectView {
        let data = self.data.read().await;
        data.view_project(project)
    }

    // --- tasks -----------------------------------------------------------

    /// Stores a new task at the end of its lane. The incoming `position` is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] if the project does not exist
    /// (or was deleted since the caller looked it up).
    pub async fn insert_task(&self, mut task: Task) -> Result<Task, StoreError> {
        let mut data = self.data.write().await;
        if !data.projects.contains_key(&task.project) {
            return Err(StoreError::ProjectNotFound(task.project));
        }
        task.position = reorder::next_position(&data.tasks, task.project, task.column);
        data.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Looks up a task.
    pub async fn task(&self, id: TaskId) -> Option<Task> {
        let data = self.data.read().await;
        data.tasks.get(&id).cloned()
    }

    /// All tasks of a project ordered by column, then position.
    pub async fn tasks_for_project(&self, project: ProjectId) -> Vec<Task> {
        let data = self.data.read().await;
        let mut tasks: Vec<Task> = data
            .tasks
            .values()
            .filter(|t| t.project == project)
            .cloned()
            .collect();
        drop(data);
        tasks.sort_by(|a, b| {
            a.column
                .cmp(&b.column)
                .then(a.position.cmp(&b.position))
                .then(b.created_at.cmp(&a.created_at))
        });
        tasks
    }

    /// Applies `edit` to a task, returning the task before and after.
    ///
    /// `edit` must not change `column` or `position`; use
    /// [`move_task`](Self::move_task) for that.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task is unknown.
    pub async fn update_task<F>(&self, id: TaskId, edit: F) -> Result<(Task, Task), StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let mut data = self.data.write().await;
        let task = data.tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        let before = task.clone();
        edit(task);
        task.column = before.column;
        task.position = before.position;
        task.updated_at = Utc::now();
        Ok((before, task.clone()))
    }

    /// Moves a task and reindexes the affected lanes in one step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task is unknown.
    pub async fn move_task(
        &self,
        id: TaskId,
        column: Column,
        position: u32,
    ) -> Result<(Task, MoveOutcome), StoreError> {
        let mut data = self.data.write().await;
        let outcome = reorder::move_task(&mut data.tasks, id, column, position, Utc::now())?;
        let task = data
            .tasks
            .get(&id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(id))?;
        Ok((task, outcome))
    }

    /// Deletes a task and closes the gap in its lane.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task is unknown.
    pub async fn delete_task(&self, id: TaskId) -> Result<Task, StoreError> {
        let mut data = self.data.write().await;
        let (removed, shifted) = reorder::remove_task(&mut data.tasks, id, Utc::now())?;
        drop(data);
        tracing::debug!(
            task_id = %id,
            column = %removed.column,
            shifted = shifted.len(),
            "task removed and lane compacted"
        );
        Ok(removed)
    }

    /// Whether a lane's positions are exactly `0..n`.
    pub async fn check_lane(&self, project: ProjectId, column: Column) -> bool {
        let data = self.data.read().await;
        reorder::check_lane(&data.tasks, project, column)
    }

    /// Resolves user references of a task for display.
    pub async fn view_task(&self, task: &Task) -> TaskView {
        let data = self.data.read().await;
        data.view_task(task)
    }

    /// Resolves a list of tasks for display.
    pub async fn view_tasks(&self, tasks: &[Task]) -> Vec<TaskView> {
        let data = self.data.read().await;
        tasks.iter().map(|t| data.view_task(t)).collect()
    }

    // --- inbox -----------------------------------------------------------

    /// Appends a notification to a user's inbox.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the recipient is unknown.
    pub async fn push_notification(
        &self,
        user: UserId,
        notification: Notification,
    ) -> Result<Notification, StoreError> {
        let mut data = self.data.write().await;
        data.user_mut(user)?.inbox.push(notification.clone());
        Ok(notification)
    }

    /// A user's notifications, newest first. Unknown users have none.
    pub async fn notifications(&self, user: UserId) -> Vec<Notification> {
        let data = self.data.read().await;
        data.users
            .get(&user)
            .map(|u| u.inbox.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Marks one notification as read. Marking it again is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] or
    /// [`StoreError::NotificationNotFound`].
    pub async fn mark_read(&self, user: UserId, id: NotificationId) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let notification = data
            .user_mut(user)?
            .inbox
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(StoreError::NotificationNotFound(id))?;
        notification.read = true;
        Ok(())
    }

    /// Marks every notification of a user as read, returning how many were
    /// previously unread.
    pub async fn mark_all_read(&self, user: UserId) -> usize {
        let mut data = self.data.write().await;
        let Some(u) = data.users.get_mut(&user) else {
            return 0;
        };
        let mut flipped = 0;
        for notification in u.inbox.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            flipped += 1;
        }
        flipped
    }
}

/// Writes the store to its snapshot file after mutations.
///
/// Saves are serialised so concurrent writers never interleave on the
/// temporary file. Failures are logged and otherwise ignored.
#[derive(Clone, Default)]
pub struct SnapshotWriter {
    path: Option<Arc<PathBuf>>,
    lock: Arc<Mutex<()>>,
}

impl SnapshotWriter {
    /// Creates a writer; `None` disables persistence.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.map(Arc::new),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether snapshots are written at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Saves the store if persistence is enabled.
    pub async fn persist(&self, store: &BoardStore) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.lock.lock().await;
        if let Err(e) = store.save(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to write snapshot");
        }
    }
}
