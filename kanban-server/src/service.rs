//! Board operations with access control, validation and side effects.
//!
//! Every mutating operation follows the same shape: validate input, check
//! the caller's access, apply the change to the [`BoardStore`], publish the
//! resulting event to the project room, queue notifications, and write a
//! snapshot if persistence is enabled.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use kanban_proto::board::{
    Column, Comment, DEFAULT_PROJECT_COLOR, MAX_COMMENT_LENGTH, MAX_PROJECT_NAME_LENGTH,
    MAX_TASK_TITLE_LENGTH, Member, Priority, Project, ProjectView, Role, Task, TaskView,
    UserSummary,
};
use kanban_proto::event::BoardEvent;
use kanban_proto::ids::{CommentId, NotificationId, ProjectId, TaskId, UserId};
use kanban_proto::notification::Notification;
use kanban_proto::request::{
    AddMemberRequest, CommentRequest, CreateProjectRequest, CreateTaskRequest, FieldError,
    MoveTaskRequest, UpdateProjectRequest, UpdateTaskRequest,
};

use crate::notify::Notifier;
use crate::rooms::EventSink;
use crate::store::{BoardStore, SnapshotWriter, StoreError};

/// Maximum number of users returned by a search.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Shortest query `search_users` will run.
pub const MIN_SEARCH_QUERY_CHARS: usize = 2;

/// Errors returned by board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The request was malformed; nothing was changed.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),
    /// The caller may not perform this operation.
    #[error("access denied")]
    Forbidden,
    /// The named resource does not exist or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Internal store failure.
    #[error(transparent)]
    Store(StoreError),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BoardError {
    fn invalid(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<StoreError> for BoardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TaskNotFound(_) => Self::NotFound("task"),
            StoreError::ProjectNotFound(_) => Self::NotFound("project"),
            StoreError::UserNotFound(_) => Self::NotFound("user"),
            StoreError::NotificationNotFound(_) => Self::NotFound("notification"),
            other => Self::Store(other),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User identifier.
    pub id: UserId,
    /// Display name (may be empty).
    pub name: String,
    /// Email address (may be empty).
    pub email: String,
}

impl Principal {
    /// Name shown to other users in notification text.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.email.is_empty() {
            &self.email
        } else {
            "Someone"
        }
    }
}

/// Collects field errors for one request.
#[derive(Default)]
struct Checks(Vec<FieldError>);

impl Checks {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    /// Trimmed, non-empty text no longer than `max` characters.
    fn text(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let trimmed = value.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            self.fail(field, format!("{field} is required"));
            None
        } else if trimmed.chars().count() > max {
            self.fail(field, format!("{field} must be at most {max} characters"));
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn parse<T: std::str::FromStr<Err = String>>(
        &mut self,
        field: &str,
        value: Option<&str>,
    ) -> Option<T> {
        match value?.parse() {
            Ok(v) => Some(v),
            Err(message) => {
                self.fail(field, message);
                None
            }
        }
    }

    fn finish(self) -> Result<(), BoardError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(BoardError::Validation(self.0))
        }
    }
}

/// Parses the body of a move request.
///
/// # Errors
///
/// Returns [`BoardError::Validation`] for a missing or unknown column, or a
/// position that is not a non-negative integer.
pub fn parse_move(req: &MoveTaskRequest) -> Result<(Column, u32), BoardError> {
    let mut checks = Checks::default();
    let column = match req.column.as_deref() {
        None => {
            checks.fail("column", "column is required");
            None
        }
        Some(raw) => checks.parse::<Column>("column", Some(raw)),
    };
    let position = req
        .position
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .map(|p| u32::try_from(p).unwrap_or(u32::MAX));
    if position.is_none() {
        checks.fail("position", "position must be a non-negative integer");
    }
    checks.finish()?;
    match (column, position) {
        (Some(column), Some(position)) => Ok((column, position)),
        _ => Err(BoardError::invalid("column", "invalid move")),
    }
}

/// Whether an edit changed anything a user can see on the card.
fn fields_changed(before: &Task, after: &Task) -> bool {
    before.title != after.title
        || before.description != after.description
        || before.priority != after.priority
        || before.due_date != after.due_date
        || before.assigned_to != after.assigned_to
}

fn dedup_users(users: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users.into_iter().filter(|u| seen.insert(*u)).collect()
}

/// Board operations shared by the REST and WebSocket layers.
#[derive(Clone)]
pub struct BoardService {
    store: Arc<BoardStore>,
    sink: Arc<dyn EventSink>,
    notifier: Notifier,
    snapshots: SnapshotWriter,
}

impl BoardService {
    /// Wires a service to its store, event sink and notification outbox.
    #[must_use]
    pub fn new(
        store: Arc<BoardStore>,
        sink: Arc<dyn EventSink>,
        notifier: Notifier,
        snapshots: SnapshotWriter,
    ) -> Self {
        Self {
            store,
            sink,
            notifier,
            snapshots,
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<BoardStore> {
        &self.store
    }

    /// Records the caller in the user directory.
    pub async fn authenticate(&self, principal: &Principal) -> UserSummary {
        self.store
            .upsert_user(principal.id, &principal.name, &principal.email)
            .await
    }

    /// Whether `user` may see and work on `project`.
    pub async fn can_access(&self, user: UserId, project: ProjectId) -> bool {
        self.store
            .project(project)
            .await
            .is_some_and(|p| p.has_access(user))
    }

    async fn visible_project(&self, user: UserId, id: ProjectId) -> Result<Project, BoardError> {
        self.store
            .project(id)
            .await
            .filter(|p| p.has_access(user))
            .ok_or(BoardError::NotFound("project"))
    }

    async fn managed_project(&self, user: UserId, id: ProjectId) -> Result<Project, BoardError> {
        let project = self.visible_project(user, id).await?;
        if project.is_admin(user) {
            Ok(project)
        } else {
            Err(BoardError::Forbidden)
        }
    }

    async fn accessible_task(&self, user: UserId, id: TaskId) -> Result<(Task, Project), BoardError> {
        let task = self
            .store
            .task(id)
            .await
            .ok_or(BoardError::NotFound("task"))?;
        let project = self
            .store
            .project(task.project)
            .await
            .ok_or(BoardError::NotFound("project"))?;
        if !project.has_access(user) {
            return Err(BoardError::Forbidden);
        }
        Ok((task, project))
    }

    async fn publish_task(&self, task: &Task, created: bool) -> TaskView {
        let view = self.store.view_task(task).await;
        let event = if created {
            BoardEvent::TaskCreated {
                project_id: task.project,
                task: view.clone(),
            }
        } else {
            BoardEvent::TaskUpdated {
                project_id: task.project,
                task: view.clone(),
            }
        };
        self.sink.publish(task.project, &event);
        view
    }

    // --- projects --------------------------------------------------------

    /// Projects the caller owns or belongs to, most recently updated first.
    pub async fn list_projects(&self, principal: &Principal) -> Vec<ProjectView> {
        let projects = self.store.projects_for(principal.id).await;
        let mut views = Vec::with_capacity(projects.len());
        for project in &projects {
            views.push(self.store.view_project(project).await);
        }
        views
    }

    /// One project.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] if the project is unknown or not visible.
    pub async fn get_project(
        &self,
        principal: &Principal,
        id: ProjectId,
    ) -> Result<ProjectView, BoardError> {
        let project = self.visible_project(principal.id, id).await?;
        Ok(self.store.view_project(&project).await)
    }

    /// Creates a project owned by the caller.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] if the name is missing or too long.
    pub async fn create_project(
        &self,
        principal: &Principal,
        req: CreateProjectRequest,
    ) -> Result<ProjectView, BoardError> {
        let mut checks = Checks::default();
        let name = checks.text("name", req.name.as_deref(), MAX_PROJECT_NAME_LENGTH);
        checks.finish()?;

        let now = Utc::now();
        let project = Project {
            id: ProjectId::new(),
            name: name.unwrap_or_default(),
            description: req.description.unwrap_or_default(),
            color: req
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            background: req.background.unwrap_or_default(),
            owner: principal.id,
            members: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_project(project.clone()).await;
        tracing::info!(project_id = %project.id, owner = %principal.id, "project created");
        self.snapshots.persist(&self.store).await;
        Ok(self.store.view_project(&project).await)
    }

    /// Edits a project's presentation fields.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`], [`BoardError::Forbidden`] for non-admins,
    /// or [`BoardError::Validation`] for an over-long name.
    pub async fn update_project(
        &self,
        principal: &Principal,
        id: ProjectId,
        req: UpdateProjectRequest,
    ) -> Result<ProjectView, BoardError> {
        let name = req
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if name
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_PROJECT_NAME_LENGTH)
        {
            return Err(BoardError::invalid(
                "name",
                &format!("name must be at most {MAX_PROJECT_NAME_LENGTH} characters"),
            ));
        }
        self.managed_project(principal.id, id).await?;

        let project = self
            .store
            .update_project(id, |p| {
                if let Some(name) = name {
                    p.name = name;
                }
                if let Some(description) = req.description {
                    p.description = description;
                }
                if let Some(color) = req.color.filter(|c| !c.trim().is_empty()) {
                    p.color = color;
                }
                if let Some(background) = req.background {
                    p.background = background;
                }
            })
            .await?;
        self.snapshots.persist(&self.store).await;
        Ok(self.store.view_project(&project).await)
    }

    /// Deletes a project and every task in it. Only the owner may do this.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] or [`BoardError::Forbidden`].
    pub async fn delete_project(&self, principal: &Principal, id: ProjectId) -> Result<(), BoardError> {
        let project = self.visible_project(principal.id, id).await?;
        if project.owner != principal.id {
            return Err(BoardError::Forbidden);
        }
        let removed = self.store.delete_project(id).await?;
        tracing::info!(project_id = %id, tasks_removed = removed, "project deleted");
        self.snapshots.persist(&self.store).await;
        Ok(())
    }

    /// Adds a user, found by email, to a project and sends them an invite
    /// notification.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for a missing email, bad role or existing
    /// member; [`BoardError::NotFound`] for an unknown project or user;
    /// [`BoardError::Forbidden`] for non-admins.
    pub async fn add_member(
        &self,
        principal: &Principal,
        id: ProjectId,
        req: AddMemberRequest,
    ) -> Result<ProjectView, BoardError> {
        let mut checks = Checks::default();
        let email = checks.text("email", req.email.as_deref(), usize::MAX);
        let role = checks
            .parse::<Role>("role", req.role.as_deref())
            .unwrap_or_default();
        checks.finish()?;

        let project = self.managed_project(principal.id, id).await?;
        let user = self
            .store
            .find_user_by_email(email.as_deref().unwrap_or_default())
            .await
            .ok_or(BoardError::NotFound("user"))?;
        if project.has_access(user.id) {
            return Err(BoardError::invalid("email", "user is already a member"));
        }

        let project = self
            .store
            .update_project(id, |p| {
                p.members.push(Member {
                    user: user.id,
                    role,
                    joined_at: Utc::now(),
                });
            })
            .await?;
        tracing::info!(project_id = %id, user_id = %user.id, role = ?role, "member added");
        self.notifier
            .notify_invite(user.id, principal.display_name(), &project.name, id);
        self.snapshots.persist(&self.store).await;
        Ok(self.store.view_project(&project).await)
    }

    /// Removes a member from a project. Removing a non-member changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] or [`BoardError::Forbidden`].
    pub async fn remove_member(
        &self,
        principal: &Principal,
        id: ProjectId,
        member: UserId,
    ) -> Result<ProjectView, BoardError> {
        let project = self.managed_project(principal.id, id).await?;
        if !project.members.iter().any(|m| m.user == member) {
            return Ok(self.store.view_project(&project).await);
        }
        let project = self
            .store
            .update_project(id, |p| p.members.retain(|m| m.user != member))
            .await?;
        let evicted = self.sink.evict_user(id, member);
        tracing::info!(project_id = %id, user_id = %member, evicted, "member removed");
        self.snapshots.persist(&self.store).await;
        Ok(self.store.view_project(&project).await)
    }

    // --- tasks -----------------------------------------------------------

    /// Tasks of a project ordered by column, then position.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] if the project is unknown or not visible.
    pub async fn list_tasks(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<TaskView>, BoardError> {
        self.visible_project(principal.id, project_id).await?;
        let tasks = self.store.tasks_for_project(project_id).await;
        Ok(self.store.view_tasks(&tasks).await)
    }

    /// Creates a task at the end of its column.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for bad input, [`BoardError::NotFound`] if
    /// the project is unknown or not visible.
    pub async fn create_task(
        &self,
        principal: &Principal,
        req: CreateTaskRequest,
    ) -> Result<TaskView, BoardError> {
        let mut checks = Checks::default();
        let title = checks.text("title", req.title.as_deref(), MAX_TASK_TITLE_LENGTH);
        if req.project.is_none() {
            checks.fail("project", "project is required");
        }
        let column = checks
            .parse::<Column>("column", req.column.as_deref())
            .unwrap_or_default();
        let priority = checks
            .parse::<Priority>("priority", req.priority.as_deref())
            .unwrap_or_default();
        checks.finish()?;

        let project_id = req.project.ok_or(BoardError::NotFound("project"))?;
        let project = self.visible_project(principal.id, project_id).await?;

        let now = Utc::now();
        let task = self
            .store
            .insert_task(Task {
                id: TaskId::new(),
                title: title.unwrap_or_default(),
                description: req.description.unwrap_or_default(),
                project: project_id,
                column,
                priority,
                due_date: req.due_date,
                assigned_to: dedup_users(req.assigned_to.unwrap_or_default()),
                position: 0,
                comments: Vec::new(),
                attachments: Vec::new(),
                created_by: principal.id,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::info!(
            task_id = %task.id,
            project_id = %project_id,
            column = %task.column,
            position = task.position,
            "task created"
        );

        self.notifier.notify_assigned(
            &task.assigned_to,
            &task.title,
            &project.name,
            task.id,
            project_id,
        );
        let view = self.publish_task(&task, true).await;
        self.snapshots.persist(&self.store).await;
        Ok(view)
    }

    /// Edits a task's fields. Column and position are left alone.
    ///
    /// Newly added assignees get an assignment notification; otherwise, if
    /// any field actually changed, the current assignees are told.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`], [`BoardError::NotFound`] or
    /// [`BoardError::Forbidden`].
    pub async fn update_task(
        &self,
        principal: &Principal,
        id: TaskId,
        req: UpdateTaskRequest,
    ) -> Result<TaskView, BoardError> {
        let mut checks = Checks::default();
        let title = req
            .title
            .is_some()
            .then(|| checks.text("title", req.title.as_deref(), MAX_TASK_TITLE_LENGTH))
            .flatten();
        let priority = checks.parse::<Priority>("priority", req.priority.as_deref());
        checks.finish()?;

        let (_, project) = self.accessible_task(principal.id, id).await?;
        let assigned_to = req.assigned_to.map(dedup_users);

        let (before, after) = self
            .store
            .update_task(id, |t| {
                if let Some(title) = title {
                    t.title = title;
                }
                if let Some(description) = req.description {
                    t.description = description;
                }
                if let Some(priority) = priority {
                    t.priority = priority;
                }
                if let Some(due_date) = req.due_date {
                    t.due_date = due_date;
                }
                if let Some(assigned_to) = assigned_to {
                    t.assigned_to = assigned_to;
                }
            })
            .await?;

        let added: Vec<UserId> = after
            .assigned_to
            .iter()
            .copied()
            .filter(|u| !before.assigned_to.contains(u))
            .collect();
        if !added.is_empty() {
            self.notifier
                .notify_assigned(&added, &after.title, &project.name, id, project.id);
        } else if !after.assigned_to.is_empty() && fields_changed(&before, &after) {
            self.notifier.notify_updated(
                &after.assigned_to,
                &after.title,
                &project.name,
                id,
                project.id,
            );
        }

        let view = self.publish_task(&after, false).await;
        self.snapshots.persist(&self.store).await;
        Ok(view)
    }

    /// Moves a task to `(column, position)` and renumbers the affected
    /// columns.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for a bad column or position,
    /// [`BoardError::NotFound`] or [`BoardError::Forbidden`].
    pub async fn move_task(
        &self,
        principal: &Principal,
        id: TaskId,
        req: &MoveTaskRequest,
    ) -> Result<TaskView, BoardError> {
        let (column, position) = parse_move(req)?;
        self.accessible_task(principal.id, id).await?;

        let (task, outcome) = self.store.move_task(id, column, position).await?;
        tracing::debug!(
            task_id = %id,
            from_column = %outcome.from.column,
            from_position = outcome.from.position,
            to_column = %outcome.to.column,
            to_position = outcome.to.position,
            shifted = outcome.shifted.len(),
            "task moved"
        );
        for lane in [outcome.from.column, outcome.to.column] {
            if !self.store.check_lane(task.project, lane).await {
                tracing::error!(project_id = %task.project, column = %lane, "lane positions not contiguous after move");
            }
        }

        let view = self.publish_task(&task, false).await;
        if !outcome.is_noop() {
            self.snapshots.persist(&self.store).await;
        }
        Ok(view)
    }

    /// Deletes a task and closes the gap in its column.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] or [`BoardError::Forbidden`].
    pub async fn delete_task(&self, principal: &Principal, id: TaskId) -> Result<(), BoardError> {
        self.accessible_task(principal.id, id).await?;
        let removed = self.store.delete_task(id).await?;
        tracing::info!(task_id = %id, project_id = %removed.project, "task deleted");

        self.sink.publish(
            removed.project,
            &BoardEvent::TaskDeleted {
                project_id: removed.project,
                task_id: id,
            },
        );
        self.snapshots.persist(&self.store).await;
        Ok(())
    }

    /// Appends a comment and tells the other assignees.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for empty text, [`BoardError::NotFound`]
    /// or [`BoardError::Forbidden`].
    pub async fn add_comment(
        &self,
        principal: &Principal,
        id: TaskId,
        req: CommentRequest,
    ) -> Result<TaskView, BoardError> {
        let mut checks = Checks::default();
        let text = checks.text("text", req.text.as_deref(), MAX_COMMENT_LENGTH);
        checks.finish()?;

        let (_, project) = self.accessible_task(principal.id, id).await?;
        let (_, after) = self
            .store
            .update_task(id, |t| {
                t.comments.push(Comment {
                    id: CommentId::new(),
                    user: principal.id,
                    text: text.unwrap_or_default(),
                    created_at: Utc::now(),
                });
            })
            .await?;

        self.notifier.notify_comment(
            &after.assigned_to,
            principal.id,
            principal.display_name(),
            &after.title,
            id,
            project.id,
        );
        let view = self.publish_task(&after, false).await;
        self.snapshots.persist(&self.store).await;
        Ok(view)
    }

    // --- users -----------------------------------------------------------

    /// Other users whose name or email contains `query`.
    pub async fn search_users(&self, principal: &Principal, query: &str) -> Vec<UserSummary> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_QUERY_CHARS {
            return Vec::new();
        }
        self.store
            .search_users(query, principal.id, MAX_SEARCH_RESULTS)
            .await
    }

    /// The caller's notifications, newest first.
    pub async fn notifications(&self, principal: &Principal) -> Vec<Notification> {
        self.store.notifications(principal.id).await
    }

    /// Marks one of the caller's notifications as read.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] if it is not in the caller's inbox.
    pub async fn mark_read(&self, principal: &Principal, id: NotificationId) -> Result<(), BoardError> {
        self.store
            .mark_read(principal.id, id)
            .await
            .map_err(|e| match e {
                StoreError::UserNotFound(_) => BoardError::NotFound("notification"),
                other => other.into(),
            })?;
        self.snapshots.persist(&self.store).await;
        Ok(())
    }

    /// Marks all of the caller's notifications as read, returning how many
    /// changed.
    pub async fn mark_all_read(&self, principal: &Principal) -> usize {
        let flipped = self.store.mark_all_read(principal.id).await;
        if flipped > 0 {
            self.snapshots.persist(&self.store).await;
        }
        flipped
    }
}
