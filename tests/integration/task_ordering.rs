//! Integration tests for task ordering through the board service.
//!
//! Covers the drag-and-drop scenarios: moving across columns, reordering
//! within a column, deleting with compaction, and rejected moves.
//!
//! Verification command: `cargo test --test task_ordering`

use kanban_proto::board::{Column, ProjectView, TaskView};
use kanban_proto::ids::{TaskId, UserId};
use kanban_proto::request::{CreateProjectRequest, CreateTaskRequest, MoveTaskRequest};
use kanban_server::server::{AppState, SharedState};
use kanban_server::service::{BoardError, Principal};

// =============================================================================
// Helpers
// =============================================================================

struct Board {
    state: SharedState,
    owner: Principal,
    project: ProjectView,
}

impl Board {
    async fn new() -> Self {
        let state = AppState::in_memory();
        let owner = Principal {
            id: UserId::new(),
            name: "Owner".to_string(),
            email: "owner@example.com".to_string(),
        };
        state.service.authenticate(&owner).await;
        let project = state
            .service
            .create_project(
                &owner,
                CreateProjectRequest {
                    name: Some("Board".to_string()),
                    ..CreateProjectRequest::default()
                },
            )
            .await
            .unwrap();
        Self {
            state,
            owner,
            project,
        }
    }

    async fn add(&self, title: &str, column: Column) -> TaskId {
        self.state
            .service
            .create_task(
                &self.owner,
                CreateTaskRequest {
                    title: Some(title.to_string()),
                    project: Some(self.project.id),
                    column: Some(column.to_string()),
                    ..CreateTaskRequest::default()
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn move_to(&self, id: TaskId, column: Column, position: u32) -> TaskView {
        self.state
            .service
            .move_task(&self.owner, id, &MoveTaskRequest::new(column, position))
            .await
            .unwrap()
    }

    /// Titles of a column in position order, with their positions.
    async fn column(&self, column: Column) -> Vec<(String, u32)> {
        self.state
            .service
            .list_tasks(&self.owner, self.project.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.column == column)
            .map(|t| (t.title, t.position))
            .collect()
    }
}

fn lane(items: &[(&str, u32)]) -> Vec<(String, u32)> {
    items.iter().map(|(t, p)| ((*t).to_string(), *p)).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn move_across_columns() {
    let board = Board::new().await;
    board.add("X", Column::Todo).await;
    let y = board.add("Y", Column::Todo).await;
    board.add("Z", Column::Todo).await;
    board.add("D1", Column::Doing).await;
    board.add("D2", Column::Doing).await;

    let moved = board.move_to(y, Column::Doing, 0).await;
    assert_eq!(moved.column, Column::Doing);
    assert_eq!(moved.position, 0);

    assert_eq!(board.column(Column::Todo).await, lane(&[("X", 0), ("Z", 1)]));
    assert_eq!(
        board.column(Column::Doing).await,
        lane(&[("Y", 0), ("D1", 1), ("D2", 2)])
    );
}

#[tokio::test]
async fn move_forward_within_column() {
    let board = Board::new().await;
    let x = board.add("X", Column::Todo).await;
    board.add("Y", Column::Todo).await;
    board.add("Z", Column::Todo).await;

    board.move_to(x, Column::Todo, 2).await;

    assert_eq!(
        board.column(Column::Todo).await,
        lane(&[("Y", 0), ("Z", 1), ("X", 2)])
    );
}

#[tokio::test]
async fn move_backward_within_column() {
    let board = Board::new().await;
    board.add("X", Column::Todo).await;
    board.add("Y", Column::Todo).await;
    let z = board.add("Z", Column::Todo).await;

    board.move_to(z, Column::Todo, 0).await;

    assert_eq!(
        board.column(Column::Todo).await,
        lane(&[("Z", 0), ("X", 1), ("Y", 2)])
    );
}

#[tokio::test]
async fn delete_compacts_column() {
    let board = Board::new().await;
    board.add("X", Column::Todo).await;
    board.add("Y", Column::Todo).await;
    let z = board.add("Z", Column::Todo).await;

    board
        .state
        .service
        .delete_task(&board.owner, z)
        .await
        .unwrap();
    assert_eq!(board.column(Column::Todo).await, lane(&[("X", 0), ("Y", 1)]));

    let only = board.add("Only", Column::Done).await;
    board
        .state
        .service
        .delete_task(&board.owner, only)
        .await
        .unwrap();
    assert!(board.column(Column::Done).await.is_empty());
}

#[tokio::test]
async fn delete_from_middle_closes_gap() {
    let board = Board::new().await;
    board.add("X", Column::Todo).await;
    let y = board.add("Y", Column::Todo).await;
    board.add("Z", Column::Todo).await;

    board
        .state
        .service
        .delete_task(&board.owner, y)
        .await
        .unwrap();
    assert_eq!(board.column(Column::Todo).await, lane(&[("X", 0), ("Z", 1)]));
}

#[tokio::test]
async fn move_to_own_slot_changes_nothing() {
    let board = Board::new().await;
    board.add("X", Column::Todo).await;
    let y = board.add("Y", Column::Todo).await;
    board.add("Z", Column::Todo).await;
    let before = board.column(Column::Todo).await;

    board.move_to(y, Column::Todo, 1).await;

    assert_eq!(board.column(Column::Todo).await, before);
}

#[tokio::test]
async fn out_of_range_position_appends() {
    let board = Board::new().await;
    let x = board.add("X", Column::Todo).await;
    board.add("D1", Column::Doing).await;

    let moved = board.move_to(x, Column::Doing, 40).await;
    assert_eq!(moved.position, 1);
    assert_eq!(
        board.column(Column::Doing).await,
        lane(&[("D1", 0), ("X", 1)])
    );
    assert!(board.column(Column::Todo).await.is_empty());
}

#[tokio::test]
async fn position_beyond_u32_appends() {
    let board = Board::new().await;
    let x = board.add("X", Column::Todo).await;
    board.add("D1", Column::Doing).await;

    let req = MoveTaskRequest {
        column: Some("doing".to_string()),
        position: Some(serde_json::json!(5_000_000_000_u64)),
    };
    let moved = board
        .state
        .service
        .move_task(&board.owner, x, &req)
        .await
        .unwrap();
    assert_eq!(moved.position, 1);
    assert_eq!(
        board.column(Column::Doing).await,
        lane(&[("D1", 0), ("X", 1)])
    );
}

#[tokio::test]
async fn new_tasks_append_after_moves() {
    let board = Board::new().await;
    let x = board.add("X", Column::Todo).await;
    board.add("Y", Column::Todo).await;
    board.move_to(x, Column::Done, 0).await;

    let z = board.add("Z", Column::Todo).await;
    let task = board.state.service.store().task(z).await.unwrap();
    assert_eq!(task.position, 1);
}

#[tokio::test]
async fn invalid_move_changes_nothing() {
    let board = Board::new().await;
    let x = board.add("X", Column::Todo).await;
    board.add("Y", Column::Todo).await;
    let before = board.column(Column::Todo).await;

    let req = MoveTaskRequest {
        column: Some("archive".to_string()),
        position: Some(serde_json::json!(0)),
    };
    let result = board.state.service.move_task(&board.owner, x, &req).await;
    assert!(matches!(result, Err(BoardError::Validation(_))));

    let req = MoveTaskRequest {
        column: Some("done".to_string()),
        position: Some(serde_json::json!(-2)),
    };
    let result = board.state.service.move_task(&board.owner, x, &req).await;
    assert!(matches!(result, Err(BoardError::Validation(_))));

    assert_eq!(board.column(Column::Todo).await, before);
}

#[tokio::test]
async fn outsider_cannot_move() {
    let board = Board::new().await;
    let x = board.add("X", Column::Todo).await;
    let outsider = Principal {
        id: UserId::new(),
        name: "Eve".to_string(),
        email: "eve@example.com".to_string(),
    };

    let result = board
        .state
        .service
        .move_task(&outsider, x, &MoveTaskRequest::new(Column::Done, 0))
        .await;
    assert!(matches!(result, Err(BoardError::Forbidden)));

    let missing = board
        .state
        .service
        .move_task(&board.owner, TaskId::new(), &MoveTaskRequest::new(Column::Done, 0))
        .await;
    assert!(matches!(missing, Err(BoardError::NotFound(_))));
}

#[tokio::test]
async fn concurrent_moves_keep_columns_contiguous() {
    let board = Board::new().await;
    let mut ids = Vec::new();
    for i in 0..12 {
        ids.push(board.add(&format!("T{i}"), Column::Todo).await);
    }

    let mut handles = Vec::new();
    for (i, id) in ids.iter().copied().enumerate() {
        let state = SharedState::clone(&board.state);
        let owner = board.owner.clone();
        let column = Column::ALL[i % 3];
        handles.push(tokio::spawn(async move {
            let position = u32::try_from(i % 4).unwrap();
            state
                .service
                .move_task(&owner, id, &MoveTaskRequest::new(column, position))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let store = board.state.service.store();
    for column in Column::ALL {
        assert!(store.check_lane(board.project.id, column).await);
    }
    assert_eq!(store.tasks_for_project(board.project.id).await.len(), 12);
}
