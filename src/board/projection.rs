//! Speculative client-side view of a board.
//!
//! The two `apply_*` functions are pure snapshot transforms used to show a
//! drag result before the store confirms it. [`Projection`] layers them on
//! top of the last confirmed snapshot:
//!
//! ```text
//! current = confirmed + pending[0] + pending[1] + ...
//! ```
//!
//! Confirming an intent folds it (or a fresh server read) into `confirmed`;
//! rejecting one drops it and rebuilds `current` from `confirmed`, so a failed
//! commit never leaves stale speculative state on screen.

use super::drag::Intent;
use super::models::{BoardSnapshot, Task};

/// Move `task_id` to `new_index` inside `column_id`.
///
/// Returns the snapshot unchanged when the column or task is missing. An
/// index past the end places the task last.
pub fn apply_reorder_within_column(
    snapshot: &BoardSnapshot,
    column_id: i64,
    task_id: i64,
    new_index: usize,
) -> BoardSnapshot {
    let mut next = snapshot.clone();
    let Some(column) = next.columns.iter_mut().find(|c| c.column.id == column_id) else {
        return next;
    };
    let Some(from) = column.tasks.iter().position(|t| t.id == task_id) else {
        return next;
    };
    let task = column.tasks.remove(from);
    let to = new_index.min(column.tasks.len());
    column.tasks.insert(to, task);
    renumber(&mut column.tasks);
    next
}

/// Move `task_id` out of `source_column_id` into `target_column_id` at `new_index`.
///
/// Returns the snapshot unchanged when either column or the task is missing.
/// An index past the end of the target appends.
pub fn apply_move_between_columns(
    snapshot: &BoardSnapshot,
    source_column_id: i64,
    target_column_id: i64,
    task_id: i64,
    new_index: usize,
) -> BoardSnapshot {
    if source_column_id == target_column_id {
        return apply_reorder_within_column(snapshot, source_column_id, task_id, new_index);
    }

    let source_idx = snapshot
        .columns
        .iter()
        .position(|c| c.column.id == source_column_id);
    let target_idx = snapshot
        .columns
        .iter()
        .position(|c| c.column.id == target_column_id);
    let (Some(source_idx), Some(target_idx)) = (source_idx, target_idx) else {
        return snapshot.clone();
    };
    let Some(from) = snapshot.columns[source_idx]
        .tasks
        .iter()
        .position(|t| t.id == task_id)
    else {
        return snapshot.clone();
    };

    let mut next = snapshot.clone();
    let mut task = next.columns[source_idx].tasks.remove(from);
    renumber(&mut next.columns[source_idx].tasks);

    task.column_id = target_column_id;
    let target = &mut next.columns[target_idx].tasks;
    let to = new_index.min(target.len());
    target.insert(to, task);
    renumber(target);
    next
}

/// Apply a classified drag intent to a snapshot.
pub fn apply_intent(snapshot: &BoardSnapshot, intent: &Intent) -> BoardSnapshot {
    match *intent {
        Intent::Reorder {
            task_id,
            column_id,
            new_index,
        } => apply_reorder_within_column(snapshot, column_id, task_id, new_index),
        Intent::Move {
            task_id,
            source_column_id,
            target_column_id,
            new_index,
        } => apply_move_between_columns(
            snapshot,
            source_column_id,
            target_column_id,
            task_id,
            new_index,
        ),
    }
}

/// Whether `snapshot` already shows the end state `intent` asks for.
///
/// Same-column moves past the end count as landing last, matching the store.
pub fn intent_holds(snapshot: &BoardSnapshot, intent: &Intent) -> bool {
    let (column_id, wanted) = match *intent {
        Intent::Reorder {
            column_id,
            new_index,
            ..
        } => (column_id, new_index),
        Intent::Move {
            target_column_id,
            new_index,
            ..
        } => (target_column_id, new_index),
    };
    let Some(column) = snapshot.column(column_id) else {
        return false;
    };
    let last = column.tasks.len().saturating_sub(1);
    column.tasks.iter().position(|t| t.id == intent.task_id()) == Some(wanted.min(last))
}

fn renumber(tasks: &mut [Task]) {
    for (i, task) in tasks.iter_mut().enumerate() {
        task.position = i as i64;
    }
}

impl BoardSnapshot {
    /// Keep only tasks whose title contains `query`, ignoring case.
    ///
    /// Columns are kept even when empty. Task positions are left as stored.
    pub fn filter_tasks(&self, query: &str) -> BoardSnapshot {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        for column in &mut next.columns {
            column
                .tasks
                .retain(|t| t.title.to_lowercase().contains(&needle));
        }
        next
    }
}

/// Identifies one speculative intent inside a [`Projection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingId(u64);

/// Confirmed snapshot plus the speculative intents layered on top of it.
#[derive(Debug, Clone)]
pub struct Projection {
    confirmed: BoardSnapshot,
    pending: Vec<(PendingId, Intent)>,
    current: BoardSnapshot,
    next_id: u64,
}

impl Projection {
    pub fn new(snapshot: BoardSnapshot) -> Self {
        Self {
            current: snapshot.clone(),
            confirmed: snapshot,
            pending: Vec::new(),
            next_id: 0,
        }
    }

    /// What the user should see right now.
    pub fn current(&self) -> &BoardSnapshot {
        &self.current
    }

    /// Last state the store confirmed.
    pub fn confirmed(&self) -> &BoardSnapshot {
        &self.confirmed
    }

    pub fn version(&self) -> u64 {
        self.confirmed.version
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Speculatively apply `intent` and remember it until it is settled.
    pub fn apply(&mut self, intent: Intent) -> PendingId {
        let id = PendingId(self.next_id);
        self.next_id += 1;
        self.current = apply_intent(&self.current, &intent);
        self.pending.push((id, intent));
        id
    }

    /// Mark an intent as committed.
    ///
    /// With `server` the fresh read becomes the confirmed snapshot; otherwise
    /// the intent itself is folded into the confirmed snapshot. Either way the
    /// remaining pending intents are replayed on top.
    pub fn confirm(&mut self, id: PendingId, server: Option<BoardSnapshot>) {
        let Some(intent) = self.take_pending(id) else {
            return;
        };
        let next_version = self.confirmed.version + 1;
        let mut confirmed = match server {
            Some(snapshot) => snapshot,
            None => apply_intent(&self.confirmed, &intent),
        };
        confirmed.version = next_version;
        self.confirmed = confirmed;
        self.rebuild();
    }

    /// Drop a failed intent and rebuild the view from the confirmed snapshot.
    pub fn reject(&mut self, id: PendingId) -> Option<Intent> {
        let intent = self.take_pending(id)?;
        self.rebuild();
        Some(intent)
    }

    /// Adopt a server snapshot pushed from elsewhere (e.g. another client's
    /// change), keeping local pending intents on top of it.
    pub fn reset(&mut self, server: BoardSnapshot) {
        let next_version = self.confirmed.version + 1;
        self.confirmed = BoardSnapshot {
            version: next_version,
            ..server
        };
        self.rebuild();
    }

    fn take_pending(&mut self, id: PendingId) -> Option<Intent> {
        let idx = self.pending.iter().position(|(pid, _)| *pid == id)?;
        Some(self.pending.remove(idx).1)
    }

    fn rebuild(&mut self) {
        self.current = self
            .pending
            .iter()
            .fold(self.confirmed.clone(), |snap, (_, intent)| {
                apply_intent(&snap, intent)
            });
    }
}
