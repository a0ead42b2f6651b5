//! Kanban board: position store, optimistic projection and drag controller.
//!
//! ## Overview
//!
//! Boards own ordered columns, columns own ordered tasks. Every ordering is
//! dense (`0..N-1`, no gaps, no duplicates) and is only ever changed through
//! the two position-store mutations, `reorder_task` and `move_task`. Clients
//! show the result of a drag immediately and reconcile once the store
//! answers.
//!
//! ## Module Map
//!
//! ```text
//! ┌────────────────────────────────────┐        ┌───────────────────────────────────┐
//! │ drag.rs        gesture → Intent    │        │ server.rs   Router, ServerConfig  │
//! │ projection.rs  confirmed + pending │        │   └─ api.rs  handlers, AppState   │
//! │ controller.rs  DragController      │  HTTP  │   └─ ws.rs   BoardEvent feed      │
//! │   └─ BoardStore ──> client.rs ─────┼──────> │              │                    │
//! │   └─ BoardStore ──> db.rs (local)  │        │              v                    │
//! └────────────────────────────────────┘        │ db.rs      BoardDb / DbHandle     │
//!                                               │   └─ positions.rs  WritePlan      │
//!                                               └───────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | `Board`, `Column`, `Task`, `Priority`, `BoardSnapshot`  |
//! | `positions` | Pure ordering arithmetic and the two-phase `WritePlan`  |
//! | `display`   | Priority badges, due-date text, terminal board layout   |
//!
//! ## Drag Flow (task dropped on another column)
//!
//! 1. `DragController::release()` feeds the drop into `drag::transition()`,
//!    which classifies it as `Intent::Move` at the end of the target column.
//! 2. The intent is applied to the `Projection` immediately and a
//!    `CommitTicket` is returned.
//! 3. `CommitTicket::commit()` calls `BoardStore::move_task()` with a timeout
//!    and bounded retry, then reloads the board.
//! 4. On the server, `BoardDb::move_task()` plans the new orderings, parks the
//!    affected tasks on negative scratch positions and writes the finals, all
//!    in one transaction, then `api.rs` broadcasts `TaskMoved` and
//!    `BoardInvalidated`.
//! 5. `DragController::settle()` confirms the intent, or rolls it back and
//!    queues a `Notice`.

pub mod api;
pub mod client;
pub mod controller;
pub mod db;
pub mod display;
pub mod drag;
pub mod models;
pub mod positions;
pub mod projection;
pub mod server;
pub mod ws;
