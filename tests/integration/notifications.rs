//! Integration tests for the notification outbox and per-user inbox.
//!
//! Notifications are delivered by a background worker, so inbox checks
//! poll until the expected count arrives.
//!
//! Verification command: `cargo test --test notifications`

use std::time::Duration;

use futures_util::StreamExt;
use kanban_proto::board::ProjectView;
use kanban_proto::codec;
use kanban_proto::event::{BoardEvent, ServerFrame};
use kanban_proto::ids::{NotificationId, TaskId, UserId};
use kanban_proto::notification::{Notification, NotificationKind};
use kanban_proto::request::{
    AddMemberRequest, CommentRequest, CreateProjectRequest, CreateTaskRequest, UpdateTaskRequest,
};
use kanban_server::server::{AppState, SharedState, start_server_with_state};
use kanban_server::service::{BoardError, Principal};
use tokio_tungstenite::tungstenite;

// =============================================================================
// Helpers
// =============================================================================

async fn user(state: &SharedState, name: &str) -> Principal {
    let principal = Principal {
        id: UserId::new(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
    };
    state.service.authenticate(&principal).await;
    principal
}

async fn project(state: &SharedState, owner: &Principal, name: &str) -> ProjectView {
    state
        .service
        .create_project(
            owner,
            CreateProjectRequest {
                name: Some(name.to_string()),
                ..CreateProjectRequest::default()
            },
        )
        .await
        .unwrap()
}

async fn add_member(state: &SharedState, owner: &Principal, project: &ProjectView, member: &Principal) {
    state
        .service
        .add_member(
            owner,
            project.id,
            AddMemberRequest {
                email: Some(member.email.clone()),
                role: None,
            },
        )
        .await
        .unwrap();
}

async fn assigned_task(
    state: &SharedState,
    who: &Principal,
    project: &ProjectView,
    title: &str,
    assignees: Vec<UserId>,
) -> TaskId {
    state
        .service
        .create_task(
            who,
            CreateTaskRequest {
                title: Some(title.to_string()),
                project: Some(project.id),
                assigned_to: Some(assignees),
                ..CreateTaskRequest::default()
            },
        )
        .await
        .unwrap()
        .id
}

/// Polls the inbox until it holds `count` notifications.
async fn wait_for_inbox(state: &SharedState, who: &Principal, count: usize) -> Vec<Notification> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let inbox = state.service.notifications(who).await;
        if inbox.len() >= count {
            return inbox;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "inbox has {} notifications, expected {count}",
            inbox.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Gives the worker time to process anything still queued.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn assignment_lands_in_inbox() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;

    let task = assigned_task(&state, &ann, &board, "Ship", vec![bob.id]).await;

    let inbox = wait_for_inbox(&state, &bob, 2).await;
    let assigned = &inbox[0];
    assert_eq!(assigned.kind, NotificationKind::TaskAssigned);
    assert_eq!(
        assigned.message,
        "A new task \"Ship\" was assigned to you in project \"Roadmap\""
    );
    assert_eq!(assigned.task_id, Some(task));
    assert_eq!(assigned.project_id, Some(board.id));
    assert!(!assigned.read);

    assert_eq!(inbox[1].kind, NotificationKind::ProjectInvite);
}

#[tokio::test]
async fn comment_skips_commenter() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;
    let task = assigned_task(&state, &ann, &board, "Ship", vec![ann.id, bob.id]).await;

    wait_for_inbox(&state, &ann, 1).await;
    wait_for_inbox(&state, &bob, 2).await;

    state
        .service
        .add_comment(
            &bob,
            task,
            CommentRequest {
                text: Some("on it".to_string()),
            },
        )
        .await
        .unwrap();

    let inbox = wait_for_inbox(&state, &ann, 2).await;
    assert_eq!(inbox[0].kind, NotificationKind::TaskComment);
    assert_eq!(inbox[0].message, "Bob commented on task \"Ship\"");

    settle().await;
    assert_eq!(state.service.notifications(&bob).await.len(), 2);
}

#[tokio::test]
async fn edit_of_assigned_task_notifies_assignees() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;
    let task = assigned_task(&state, &ann, &board, "Ship", vec![bob.id]).await;
    wait_for_inbox(&state, &bob, 2).await;

    state
        .service
        .update_task(
            &ann,
            task,
            UpdateTaskRequest {
                description: Some("details".to_string()),
                ..UpdateTaskRequest::default()
            },
        )
        .await
        .unwrap();

    let inbox = wait_for_inbox(&state, &bob, 3).await;
    assert_eq!(inbox[0].kind, NotificationKind::TaskUpdated);
    assert_eq!(
        inbox[0].message,
        "Task \"Ship\" was updated in project \"Roadmap\""
    );
}

#[tokio::test]
async fn empty_edit_sends_no_notice() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;
    let task = assigned_task(&state, &ann, &board, "Ship", vec![bob.id]).await;
    wait_for_inbox(&state, &bob, 2).await;

    state
        .service
        .update_task(&ann, task, UpdateTaskRequest::default())
        .await
        .unwrap();

    settle().await;
    let inbox = state.service.notifications(&bob).await;
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].kind, NotificationKind::TaskAssigned);
}

#[tokio::test]
async fn unknown_assignee_does_not_fail_the_request() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let board = project(&state, &ann, "Roadmap").await;
    let ghost = UserId::new();

    let task = assigned_task(&state, &ann, &board, "Ship", vec![ghost, ann.id]).await;
    assert!(state.service.store().task(task).await.is_some());

    let inbox = wait_for_inbox(&state, &ann, 1).await;
    assert_eq!(inbox[0].kind, NotificationKind::TaskAssigned);
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;

    let inbox = wait_for_inbox(&state, &bob, 1).await;
    let id = inbox[0].id;

    state.service.mark_read(&bob, id).await.unwrap();
    state.service.mark_read(&bob, id).await.unwrap();
    assert!(state.service.notifications(&bob).await[0].read);

    assert!(matches!(
        state.service.mark_read(&ann, id).await,
        Err(BoardError::NotFound(_))
    ));
    assert!(matches!(
        state.service.mark_read(&bob, NotificationId::new()).await,
        Err(BoardError::NotFound(_))
    ));
}

#[tokio::test]
async fn mark_all_read_flips_everything() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;
    assigned_task(&state, &ann, &board, "One", vec![bob.id]).await;
    assigned_task(&state, &ann, &board, "Two", vec![bob.id]).await;
    wait_for_inbox(&state, &bob, 3).await;

    assert_eq!(state.service.mark_all_read(&bob).await, 3);
    assert_eq!(state.service.mark_all_read(&bob).await, 0);
    assert!(state.service.notifications(&bob).await.iter().all(|n| n.read));
}

#[tokio::test]
async fn inbox_is_newest_first() {
    let state = AppState::in_memory();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;
    add_member(&state, &ann, &board, &bob).await;
    wait_for_inbox(&state, &bob, 1).await;
    assigned_task(&state, &ann, &board, "Later", vec![bob.id]).await;

    let inbox = wait_for_inbox(&state, &bob, 2).await;
    assert_eq!(inbox[0].kind, NotificationKind::TaskAssigned);
    assert_eq!(inbox[1].kind, NotificationKind::ProjectInvite);
}

#[tokio::test]
async fn live_session_receives_notification_event() {
    let state = AppState::in_memory();
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", SharedState::clone(&state))
        .await
        .unwrap();
    let ann = user(&state, "Ann").await;
    let bob = user(&state, "Bob").await;
    let board = project(&state, &ann, "Roadmap").await;

    let url = format!("ws://{addr}/ws?user_id={}", bob.id);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.rooms.session_count() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "session never registered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    add_member(&state, &ann, &board, &bob).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    let text = match msg {
        tungstenite::Message::Text(text) => text,
        other => panic!("expected text frame, got {other:?}"),
    };
    match codec::decode_server(text.as_str()).unwrap() {
        ServerFrame::Event(BoardEvent::NotificationCreated {
            user_id,
            notification,
        }) => {
            assert_eq!(user_id, bob.id);
            assert_eq!(notification.kind, NotificationKind::ProjectInvite);
            assert_eq!(notification.message, "Ann added you to project \"Roadmap\"");
        }
        other => panic!("expected notification-created, got {other:?}"),
    }
}
