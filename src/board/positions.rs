//! Dense ordering arithmetic for tasks within columns.
//!
//! Everything here is pure: callers read the current ordering, ask for the
//! desired ordering, and receive a [`WritePlan`] that moves every affected
//! task through a distinct negative scratch position before it lands on its
//! final slot. `db.rs` executes the plan inside a single transaction; nothing
//! else in the crate writes a task position.

use crate::errors::{BoardError, Result};

/// Final (column, position) of one task after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub task_id: i64,
    pub column_id: i64,
    pub position: i64,
}

/// Two-phase write for a set of placements.
///
/// `scratch` and `finals` list the same tasks in the same order. Scratch
/// positions are negative and pairwise distinct, so applying `scratch` first
/// never collides with a live `0..N-1` position or with itself, and applying
/// `finals` afterwards only ever targets slots vacated by phase one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    pub scratch: Vec<Placement>,
    pub finals: Vec<Placement>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.finals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.finals.len()
    }
}

/// Scratch position for the `slot`-th affected task: -1, -2, -3, ...
pub fn scratch_position(slot: usize) -> i64 {
    -(slot as i64) - 1
}

/// Whether `positions` is exactly `{0, 1, ..., len-1}` in some order.
pub fn is_dense(positions: &[i64]) -> bool {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(i, p)| *p == i as i64)
}

/// Ordering of `ordered` after moving `task_id` to `new_index`.
///
/// `new_index` must address an existing slot (`0..len`).
pub fn reorder(ordered: &[i64], column_id: i64, task_id: i64, new_index: usize) -> Result<Vec<i64>> {
    let from = ordered
        .iter()
        .position(|id| *id == task_id)
        .ok_or(BoardError::TaskNotInColumn { task_id, column_id })?;
    if new_index >= ordered.len() {
        return Err(BoardError::IndexOutOfBounds {
            column_id,
            index: new_index,
            max: ordered.len() - 1,
        });
    }
    let mut next = ordered.to_vec();
    let id = next.remove(from);
    next.insert(new_index, id);
    Ok(next)
}

/// Orderings of the source and target columns after moving `task_id`.
///
/// `new_index` may be anything in `0..=target.len()`; `target.len()` appends.
/// When both columns are the same the move degenerates into a reorder and an
/// index equal to the column's count places the task last.
pub fn move_between(
    source: &[i64],
    source_column_id: i64,
    target: &[i64],
    target_column_id: i64,
    task_id: i64,
    new_index: usize,
) -> Result<(Vec<i64>, Vec<i64>)> {
    if !source.contains(&task_id) {
        return Err(BoardError::TaskNotInColumn {
            task_id,
            column_id: source_column_id,
        });
    }
    if new_index > target.len() {
        return Err(BoardError::IndexOutOfBounds {
            column_id: target_column_id,
            index: new_index,
            max: target.len(),
        });
    }

    if source_column_id == target_column_id {
        let last = source.len() - 1;
        let next = reorder(source, source_column_id, task_id, new_index.min(last))?;
        return Ok((next.clone(), next));
    }

    let next_source: Vec<i64> = source.iter().copied().filter(|id| *id != task_id).collect();
    let mut next_target = target.to_vec();
    next_target.insert(new_index, task_id);
    Ok((next_source, next_target))
}

/// Placements implied by an ordering: the i-th id lands on position i.
pub fn placements(column_id: i64, ordered: &[i64]) -> Vec<Placement> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, id)| Placement {
            task_id: *id,
            column_id,
            position: i as i64,
        })
        .collect()
}

/// Build the two-phase write that turns `current` into `desired`.
///
/// Only tasks whose column or position changes are included.
pub fn plan_writes(current: &[Placement], desired: &[Placement]) -> WritePlan {
    let changed: Vec<Placement> = desired
        .iter()
        .filter(|want| !current.iter().any(|have| have == *want))
        .copied()
        .collect();

    let scratch = changed
        .iter()
        .enumerate()
        .map(|(slot, p)| Placement {
            position: scratch_position(slot),
            ..*p
        })
        .collect();

    WritePlan {
        scratch,
        finals: changed,
    }
}
