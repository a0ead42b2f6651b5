//! Pointer-drag gesture classification as a pure state machine.
//!
//! ```text
//! Idle ──down──> Pressed ──move > 3px──> Dragging <──over──> Hovering{Task,Column}
//!                   │                        │                     │
//!                   └──drop/cancel──> Idle <─┴──────drop/cancel────┘
//! ```
//!
//! Nothing here knows about rendering or persistence. The controller feeds
//! resolved [`DropTarget`]s in and receives the [`Intent`] to commit on drop.

use serde::{Deserialize, Serialize};

/// Pointer travel (device-independent pixels) that turns a press into a drag.
pub const DRAG_ACTIVATION_DISTANCE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// The task picked up by a gesture and where it sat when picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraggedTask {
    pub task_id: i64,
    pub column_id: i64,
    pub index: usize,
}

/// Something the pointer is over, resolved against the current board view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Task {
        task_id: i64,
        column_id: i64,
        index: usize,
    },
    Column {
        column_id: i64,
        task_count: usize,
    },
}

/// A domain-level change derived from a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Reorder {
        task_id: i64,
        column_id: i64,
        new_index: usize,
    },
    Move {
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        new_index: usize,
    },
}

impl Intent {
    pub fn task_id(&self) -> i64 {
        match *self {
            Self::Reorder { task_id, .. } | Self::Move { task_id, .. } => task_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    /// Pointer is down on a task but has not travelled far enough yet.
    Pressed { task: DraggedTask, origin: Point },
    Dragging { task: DraggedTask },
    HoveringTask {
        task: DraggedTask,
        over_task_id: i64,
        index: usize,
    },
    HoveringColumn {
        task: DraggedTask,
        column_id: i64,
        index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragEvent {
    PointerDown { task: DraggedTask, at: Point },
    PointerMove { at: Point },
    Over(Option<DropTarget>),
    Drop(Option<DropTarget>),
    Cancel,
}

/// Result of feeding one event into the machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: DragState,
    /// Set only on a drop that should be committed.
    pub commit: Option<Intent>,
}

impl Transition {
    fn to(state: DragState) -> Self {
        Self {
            state,
            commit: None,
        }
    }
}

impl DragState {
    /// The task being dragged, once the gesture is past the activation distance.
    pub fn dragged(&self) -> Option<DraggedTask> {
        match *self {
            Self::Dragging { task }
            | Self::HoveringTask { task, .. }
            | Self::HoveringColumn { task, .. } => Some(task),
            Self::Idle | Self::Pressed { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.dragged().is_some()
    }

    /// What would be committed if the pointer were released right now.
    pub fn candidate(&self) -> Option<Intent> {
        match *self {
            Self::HoveringTask { task, index, .. } => Some(Intent::Reorder {
                task_id: task.task_id,
                column_id: task.column_id,
                new_index: index,
            }),
            Self::HoveringColumn {
                task,
                column_id,
                index,
            } => Some(Intent::Move {
                task_id: task.task_id,
                source_column_id: task.column_id,
                target_column_id: column_id,
                new_index: index,
            }),
            _ => None,
        }
    }
}

/// Interpret a drop (or hover) target for the dragged task.
///
/// - another task in the same column at a different index: reorder to its index
/// - a column other than the task's own: move to the end of that column
/// - anything else: nothing
pub fn classify(task: &DraggedTask, target: &DropTarget) -> Option<Intent> {
    match *target {
        DropTarget::Task {
            task_id,
            column_id,
            index,
        } => {
            if column_id != task.column_id || task_id == task.task_id || index == task.index {
                return None;
            }
            Some(Intent::Reorder {
                task_id: task.task_id,
                column_id,
                new_index: index,
            })
        }
        DropTarget::Column {
            column_id,
            task_count,
        } => {
            if column_id == task.column_id {
                return None;
            }
            Some(Intent::Move {
                task_id: task.task_id,
                source_column_id: task.column_id,
                target_column_id: column_id,
                new_index: task_count,
            })
        }
    }
}

fn hover_state(task: DraggedTask, target: Option<DropTarget>) -> DragState {
    match target.as_ref().and_then(|t| classify(&task, t)) {
        Some(Intent::Reorder { new_index, .. }) => {
            let over_task_id = match target {
                Some(DropTarget::Task { task_id, .. }) => task_id,
                _ => task.task_id,
            };
            DragState::HoveringTask {
                task,
                over_task_id,
                index: new_index,
            }
        }
        Some(Intent::Move {
            target_column_id,
            new_index,
            ..
        }) => DragState::HoveringColumn {
            task,
            column_id: target_column_id,
            index: new_index,
        },
        None => DragState::Dragging { task },
    }
}

/// Advance the gesture by one event.
pub fn transition(state: DragState, event: DragEvent) -> Transition {
    match (state, event) {
        (_, DragEvent::Cancel) => Transition::to(DragState::Idle),

        (DragState::Idle, DragEvent::PointerDown { task, at }) => {
            Transition::to(DragState::Pressed { task, origin: at })
        }
        (DragState::Idle, _) => Transition::to(DragState::Idle),

        (DragState::Pressed { task, origin }, DragEvent::PointerMove { at }) => {
            if origin.distance(&at) > DRAG_ACTIVATION_DISTANCE {
                Transition::to(DragState::Dragging { task })
            } else {
                Transition::to(state)
            }
        }
        // Released before activation: a click, not a drag.
        (DragState::Pressed { .. }, DragEvent::Drop(_)) => Transition::to(DragState::Idle),
        (DragState::Pressed { .. }, _) => Transition::to(state),

        (active, DragEvent::Over(target)) => match active.dragged() {
            Some(task) => Transition::to(hover_state(task, target)),
            None => Transition::to(active),
        },
        (active, DragEvent::Drop(target)) => {
            let commit = active
                .dragged()
                .zip(target)
                .and_then(|(task, target)| classify(&task, &target));
            Transition {
                state: DragState::Idle,
                commit,
            }
        }
        (active, DragEvent::PointerMove { .. } | DragEvent::PointerDown { .. }) => {
            Transition::to(active)
        }
    }
}
