//! Position bookkeeping for tasks within `(project, column)` lanes.
//!
//! A move takes the task out of its old lane, closes the gap it leaves,
//! then inserts it at the requested index of the target lane and renumbers
//! that lane. Callers run these functions while holding the store's write
//! lock, so every lane is contiguous (`0..n`) before and after each call.
//!
//! Because the mover vacates its slot first, moving a task forward inside
//! one lane lands it right after the task that currently holds
//! `target_position`; moving it backward lands it right before that task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kanban_proto::board::{Column, Task};
use kanban_proto::ids::{ProjectId, TaskId};

/// A task's place on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Lane.
    pub column: Column,
    /// Zero-based rank within the lane.
    pub position: u32,
}

/// What a move changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The task that was moved.
    pub task_id: TaskId,
    /// Where it was.
    pub from: Slot,
    /// Where it is now (the requested slot, clamped to the lane length).
    pub to: Slot,
    /// Other tasks whose position changed as a consequence.
    pub shifted: Vec<TaskId>,
}

impl MoveOutcome {
    /// Whether the move left the board untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.shifted.is_empty()
    }
}

/// Errors raised by reorder operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Ids of the tasks in a lane, in display order.
///
/// Ties on position (which only a corrupted lane can contain) are broken
/// by creation time, then id, so renumbering is deterministic.
#[must_use]
pub fn lane(tasks: &HashMap<TaskId, Task>, project: ProjectId, column: Column) -> Vec<TaskId> {
    let mut members: Vec<&Task> = tasks
        .values()
        .filter(|t| t.project == project && t.column == column)
        .collect();
    members.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    members.into_iter().map(|t| t.id).collect()
}

/// Position a newly created task takes: one past the current maximum, or 0
/// for an empty lane.
#[must_use]
pub fn next_position(tasks: &HashMap<TaskId, Task>, project: ProjectId, column: Column) -> u32 {
    tasks
        .values()
        .filter(|t| t.project == project && t.column == column)
        .map(|t| t.position.saturating_add(1))
        .max()
        .unwrap_or(0)
}

/// Whether the lane's positions are exactly `0..n`.
#[must_use]
pub fn check_lane(tasks: &HashMap<TaskId, Task>, project: ProjectId, column: Column) -> bool {
    let mut positions: Vec<u32> = tasks
        .values()
        .filter(|t| t.project == project && t.column == column)
        .map(|t| t.position)
        .collect();
    positions.sort_unstable();
    positions
        .iter()
        .enumerate()
        .all(|(i, p)| *p == to_u32(i))
}

/// Assigns `0..n` to `order`, stamping `now` on every task whose position
/// changed and recording it in `shifted` (unless it is `skip`).
fn renumber(
    tasks: &mut HashMap<TaskId, Task>,
    order: &[TaskId],
    now: DateTime<Utc>,
    skip: TaskId,
    shifted: &mut Vec<TaskId>,
) {
    for (index, id) in order.iter().enumerate() {
        let Some(task) = tasks.get_mut(id) else {
            continue;
        };
        let position = to_u32(index);
        if task.position != position {
            task.position = position;
            task.updated_at = now;
            if *id != skip {
                shifted.push(*id);
            }
        }
    }
}

/// Moves a task to `target_position` within `target_column`.
///
/// `target_position` is clamped to the number of other tasks in the target
/// lane, so an out-of-range request appends rather than leaving a gap.
///
/// # Errors
///
/// Returns [`ReorderError::TaskNotFound`] if `task_id` is unknown; nothing
/// is modified in that case.
pub fn move_task(
    tasks: &mut HashMap<TaskId, Task>,
    task_id: TaskId,
    target_column: Column,
    target_position: u32,
    now: DateTime<Utc>,
) -> Result<MoveOutcome, ReorderError> {
    let (project, from) = {
        let task = tasks
            .get(&task_id)
            .ok_or(ReorderError::TaskNotFound(task_id))?;
        (
            task.project,
            Slot {
                column: task.column,
                position: task.position,
            },
        )
    };

    let mut shifted = Vec::new();

    let mut old_lane = lane(tasks, project, from.column);
    old_lane.retain(|id| *id != task_id);

    let mut target_lane = if from.column == target_column {
        old_lane
    } else {
        renumber(tasks, &old_lane, now, task_id, &mut shifted);
        lane(tasks, project, target_column)
    };

    let index = target_lane
        .len()
        .min(usize::try_from(target_position).unwrap_or(usize::MAX));
    target_lane.insert(index, task_id);

    if let Some(task) = tasks.get_mut(&task_id)
        && task.column != target_column
    {
        task.column = target_column;
        task.updated_at = now;
    }
    renumber(tasks, &target_lane, now, task_id, &mut shifted);

    Ok(MoveOutcome {
        task_id,
        from,
        to: Slot {
            column: target_column,
            position: to_u32(index),
        },
        shifted,
    })
}

/// Removes a task and closes the gap it leaves in its lane.
///
/// Returns the removed task and the ids of the tasks that moved up.
///
/// # Errors
///
/// Returns [`ReorderError::TaskNotFound`] if `task_id` is unknown.
pub fn remove_task(
    tasks: &mut HashMap<TaskId, Task>,
    task_id: TaskId,
    now: DateTime<Utc>,
) -> Result<(Task, Vec<TaskId>), ReorderError> {
    let removed = tasks
        .remove(&task_id)
        .ok_or(ReorderError::TaskNotFound(task_id))?;
    let remaining = lane(tasks, removed.project, removed.column);
    let mut shifted = Vec::new();
    renumber(tasks, &remaining, now, task_id, &mut shifted);
    Ok((removed, shifted))
}
