//! Notification outbox.
//!
//! Board operations enqueue [`NotificationJob`]s on a bounded channel and
//! return immediately. A single worker drains the channel, appends one
//! notification per recipient to their inbox, and pushes a
//! `notification-created` event to every session of that recipient.
//!
//! Enqueueing never blocks and never fails the caller; a full or closed
//! outbox drops the job with a warning.

use std::sync::Arc;

use kanban_proto::event::BoardEvent;
use kanban_proto::ids::{ProjectId, TaskId, UserId};
use kanban_proto::notification::{Notification, NotificationKind};
use tokio::sync::mpsc;

use crate::rooms::EventSink;
use crate::store::{BoardStore, SnapshotWriter};

/// Default number of jobs the outbox can hold.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// One notification to be fanned out to several recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    /// Users who receive the notification.
    pub recipients: Vec<UserId>,
    /// Notification category.
    pub kind: NotificationKind,
    /// Human-readable text.
    pub message: String,
    /// Related project.
    pub project_id: Option<ProjectId>,
    /// Related task.
    pub task_id: Option<TaskId>,
}

/// Sending half of the outbox, held by the board service.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotificationJob>,
}

/// Creates an outbox with room for `capacity` pending jobs.
#[must_use]
pub fn outbox(capacity: usize) -> (Notifier, mpsc::Receiver<NotificationJob>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Notifier { tx }, rx)
}

impl Notifier {
    /// Queues a job. Returns `false` if it was dropped.
    pub fn enqueue(&self, job: NotificationJob) -> bool {
        if job.recipients.is_empty() {
            return true;
        }
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    kind = %job.kind,
                    recipients = job.recipients.len(),
                    "notification outbox full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(kind = %job.kind, "notification outbox closed, dropping job");
                false
            }
        }
    }

    /// Tells newly assigned users about a task.
    pub fn notify_assigned(
        &self,
        users: &[UserId],
        task_title: &str,
        project_name: &str,
        task_id: TaskId,
        project_id: ProjectId,
    ) -> bool {
        self.enqueue(NotificationJob {
            recipients: users.to_vec(),
            kind: NotificationKind::TaskAssigned,
            message: format!(
                "A new task \"{task_title}\" was assigned to you in project \"{project_name}\""
            ),
            project_id: Some(project_id),
            task_id: Some(task_id),
        })
    }

    /// Tells assignees about a new comment. The commenter never receives
    /// their own comment notification.
    pub fn notify_comment(
        &self,
        users: &[UserId],
        commenter: UserId,
        commenter_name: &str,
        task_title: &str,
        task_id: TaskId,
        project_id: ProjectId,
    ) -> bool {
        self.enqueue(NotificationJob {
            recipients: users.iter().copied().filter(|u| *u != commenter).collect(),
            kind: NotificationKind::TaskComment,
            message: format!("{commenter_name} commented on task \"{task_title}\""),
            project_id: Some(project_id),
            task_id: Some(task_id),
        })
    }

    /// Tells existing assignees that a task they hold was edited.
    pub fn notify_updated(
        &self,
        users: &[UserId],
        task_title: &str,
        project_name: &str,
        task_id: TaskId,
        project_id: ProjectId,
    ) -> bool {
        self.enqueue(NotificationJob {
            recipients: users.to_vec(),
            kind: NotificationKind::TaskUpdated,
            message: format!("Task \"{task_title}\" was updated in project \"{project_name}\""),
            project_id: Some(project_id),
            task_id: Some(task_id),
        })
    }

    /// Tells a user they were added to a project.
    pub fn notify_invite(
        &self,
        user: UserId,
        inviter_name: &str,
        project_name: &str,
        project_id: ProjectId,
    ) -> bool {
        self.enqueue(NotificationJob {
            recipients: vec![user],
            kind: NotificationKind::ProjectInvite,
            message: format!("{inviter_name} added you to project \"{project_name}\""),
            project_id: Some(project_id),
            task_id: None,
        })
    }
}

/// Stores one job's notifications and announces them to live sessions.
///
/// Unknown recipients are skipped. Returns how many inboxes were written.
pub async fn deliver(job: NotificationJob, store: &BoardStore, sink: &dyn EventSink) -> usize {
    let mut stored = 0;
    for user_id in job.recipients {
        let notification = Notification::new(
            job.kind,
            job.message.clone(),
            job.project_id,
            job.task_id,
        );
        match store.push_notification(user_id, notification).await {
            Ok(notification) => {
                stored += 1;
                let sessions = sink.notify_user(
                    user_id,
                    &BoardEvent::NotificationCreated {
                        user_id,
                        notification,
                    },
                );
                tracing::debug!(user_id = %user_id, kind = %job.kind, sessions, "notification stored");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "skipping notification recipient");
            }
        }
    }
    stored
}

/// Drains the outbox until every [`Notifier`] has been dropped.
pub async fn run_outbox(
    mut rx: mpsc::Receiver<NotificationJob>,
    store: Arc<BoardStore>,
    sink: Arc<dyn EventSink>,
    snapshots: SnapshotWriter,
) {
    tracing::debug!("notification worker started");
    while let Some(job) = rx.recv().await {
        if deliver(job, &store, sink.as_ref()).await > 0 {
            snapshots.persist(&store).await;
        }
    }
    tracing::debug!("notification worker stopped");
}
