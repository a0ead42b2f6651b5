//! Sequences drag gestures into optimistic updates and durable commits.
//!
//! A drop produces a [`CommitTicket`] after the projection has already been
//! updated. The ticket is committed without borrowing the controller, so the
//! caller can keep feeding pointer events while the write is in flight, and
//! is then handed back to [`DragController::settle`] which either confirms
//! the intent against a fresh server read or rolls it back and queues a
//! [`Notice`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::db::DbHandle;
use super::drag::{self, DragEvent, DragState, DraggedTask, DropTarget, Intent, Point};
use super::models::BoardSnapshot;
use super::projection::{PendingId, Projection, apply_intent, intent_holds};
use crate::errors::{BoardError, ErrorKind, Result};

/// The controller's view of the position store.
/// Implementations: `DbHandle` (in-process) and `HttpBoardStore` (remote).
#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn reorder_task(&self, task_id: i64, new_index: usize, column_id: i64) -> Result<()>;

    async fn move_task(
        &self,
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        new_index: usize,
    ) -> Result<()>;

    async fn load_board(&self, board_id: i64) -> Result<BoardSnapshot>;
}

#[async_trait]
impl BoardStore for DbHandle {
    async fn reorder_task(&self, task_id: i64, new_index: usize, column_id: i64) -> Result<()> {
        self.call(move |db| db.reorder_task(task_id, new_index, column_id).map(|_| ()))
            .await
    }

    async fn move_task(
        &self,
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        new_index: usize,
    ) -> Result<()> {
        self.call(move |db| {
            db.move_task(task_id, source_column_id, target_column_id, new_index)
                .map(|_| ())
        })
        .await
    }

    async fn load_board(&self, board_id: i64) -> Result<BoardSnapshot> {
        self.call(move |db| db.get_board_snapshot(board_id)).await
    }
}

/// Timeout and retry budget for one durable commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

async fn dispatch<S: BoardStore + ?Sized>(store: &S, intent: Intent) -> Result<()> {
    match intent {
        Intent::Reorder {
            task_id,
            column_id,
            new_index,
        } => store.reorder_task(task_id, new_index, column_id).await,
        Intent::Move {
            task_id,
            source_column_id,
            target_column_id,
            new_index,
        } => {
            store
                .move_task(task_id, source_column_id, target_column_id, new_index)
                .await
        }
    }
}

/// Write `intent` through `store`, retrying transaction failures (including
/// timeouts) until the policy's attempt budget is spent.
///
/// A timed-out attempt is abandoned, not cancelled: the store may still apply
/// it. Once any attempt has timed out, every later failure is checked against
/// a fresh read of `board_id` and counts as success if the intent's end state
/// is already stored.
pub async fn commit_intent<S: BoardStore + ?Sized>(
    store: &S,
    board_id: i64,
    intent: Intent,
    policy: &CommitPolicy,
) -> Result<()> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut timed_out = false;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, dispatch(store, intent)).await {
            Ok(result) => result,
            Err(_) => {
                timed_out = true;
                Err(BoardError::CommitTimeout { attempts: attempt })
            }
        };
        let outcome = match outcome {
            Err(e) if timed_out => {
                if intent_landed(store, board_id, &intent, policy).await {
                    tracing::info!(
                        task_id = intent.task_id(),
                        attempt,
                        error = %e,
                        "Abandoned commit was applied by the store"
                    );
                    Ok(())
                } else {
                    Err(e)
                }
            }
            other => other,
        };
        match outcome {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    task_id = intent.task_id(),
                    attempt,
                    error = %e,
                    "Commit failed, retrying"
                );
                tokio::time::sleep(policy.retry_backoff * attempt).await;
            }
            other => return other,
        }
    }
}

async fn intent_landed<S: BoardStore + ?Sized>(
    store: &S,
    board_id: i64,
    intent: &Intent,
    policy: &CommitPolicy,
) -> bool {
    match tokio::time::timeout(policy.timeout, store.load_board(board_id)).await {
        Ok(Ok(snapshot)) => intent_holds(&snapshot, intent),
        Ok(Err(e)) => {
            tracing::warn!(board_id, error = %e, "Could not read board to verify commit");
            false
        }
        Err(_) => false,
    }
}

/// Presentation-layer drag payload: `{"type": "task" | "column", ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DragPayload {
    Task { task_id: i64 },
    Column { column_id: i64 },
}

/// User-visible message about a commit that was rolled back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
    pub intent: Intent,
}

/// An optimistic update waiting for its durable commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTicket {
    pub board_id: i64,
    pub pending: PendingId,
    pub intent: Intent,
}

/// Result of running a ticket against a store.
#[derive(Debug)]
pub struct CommitOutcome {
    pub result: Result<()>,
    /// Board as the store sees it after the attempt, if it could be read.
    pub server: Option<BoardSnapshot>,
}

impl CommitTicket {
    /// Commit the intent, then re-read the board so the projection can be
    /// reconciled with server truth whichever way the write went.
    pub async fn commit<S: BoardStore + ?Sized>(
        &self,
        store: &S,
        policy: &CommitPolicy,
    ) -> CommitOutcome {
        let result = commit_intent(store, self.board_id, self.intent, policy).await;
        let server = match store.load_board(self.board_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(board_id = self.board_id, error = %e, "Failed to reload board after commit");
                None
            }
        };
        CommitOutcome { result, server }
    }
}

pub struct DragController {
    board_id: i64,
    projection: Projection,
    gesture: DragState,
    policy: CommitPolicy,
    notices: Vec<Notice>,
}

impl DragController {
    pub fn new(snapshot: BoardSnapshot, policy: CommitPolicy) -> Self {
        Self {
            board_id: snapshot.board.id,
            projection: Projection::new(snapshot),
            gesture: DragState::Idle,
            policy,
            notices: Vec::new(),
        }
    }

    pub fn board_id(&self) -> i64 {
        self.board_id
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Board as it should be rendered: confirmed state plus pending intents.
    pub fn view(&self) -> &BoardSnapshot {
        self.projection.current()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn gesture(&self) -> &DragState {
        &self.gesture
    }

    /// The view with the hovered candidate applied. Never stored.
    pub fn preview(&self) -> BoardSnapshot {
        match self.gesture.candidate() {
            Some(intent) => apply_intent(self.view(), &intent),
            None => self.view().clone(),
        }
    }

    /// Start a gesture on `task_id`. Returns false if the task is not on the board.
    pub fn pointer_down(&mut self, task_id: i64, at: Point) -> bool {
        let Some(task) = self.dragged_task(task_id) else {
            return false;
        };
        self.step(DragEvent::PointerDown { task, at });
        true
    }

    pub fn pointer_move(&mut self, at: Point) {
        self.step(DragEvent::PointerMove { at });
    }

    pub fn drag_over(&mut self, payload: Option<DragPayload>) {
        let target = payload.and_then(|p| self.resolve(p));
        self.step(DragEvent::Over(target));
    }

    pub fn cancel(&mut self) {
        self.step(DragEvent::Cancel);
    }

    /// Finish the gesture. If it classifies as a commit, the projection is
    /// updated immediately and the returned ticket must be committed and
    /// settled by the caller.
    pub fn release(&mut self, payload: Option<DragPayload>) -> Option<CommitTicket> {
        let target = payload.and_then(|p| self.resolve(p));
        let intent = self.step(DragEvent::Drop(target))?;
        if !self.applies_to_view(&intent) {
            tracing::debug!(?intent, "Dropping intent for a task that moved meanwhile");
            return None;
        }

        let pending = self.projection.apply(intent);
        tracing::info!(board_id = self.board_id, ?intent, "Applied optimistic update");
        Some(CommitTicket {
            board_id: self.board_id,
            pending,
            intent,
        })
    }

    /// Reconcile the projection with the outcome of a ticket's commit.
    ///
    /// On success the intent is confirmed against the reloaded board. A
    /// failure whose reloaded board already shows the intent is confirmed
    /// too. Otherwise the intent is rolled back, the projection adopts the
    /// reloaded board if one is available, and a [`Notice`] is queued.
    pub fn settle(&mut self, ticket: CommitTicket, outcome: CommitOutcome) -> Result<()> {
        let stored = outcome
            .server
            .as_ref()
            .is_some_and(|server| intent_holds(server, &ticket.intent));
        let result = match outcome.result {
            Err(err) if stored => {
                tracing::info!(
                    board_id = self.board_id,
                    intent = ?ticket.intent,
                    error = %err,
                    "Store holds the intent despite the error"
                );
                Ok(())
            }
            other => other,
        };

        match result {
            Ok(()) => {
                self.projection.confirm(ticket.pending, outcome.server);
                tracing::info!(
                    board_id = self.board_id,
                    version = self.projection.version(),
                    "Commit confirmed"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    board_id = self.board_id,
                    intent = ?ticket.intent,
                    error = %err,
                    "Commit failed, rolling back"
                );
                self.projection.reject(ticket.pending);
                let reverted = outcome.server.is_some();
                if let Some(server) = outcome.server {
                    self.projection.reset(server);
                }
                self.notices.push(Notice {
                    kind: err.kind(),
                    message: notice_message(&ticket.intent, &err, reverted),
                    intent: ticket.intent,
                });
                Err(err)
            }
        }
    }

    /// Release, commit and settle in one go. `None` when the drop was a no-op.
    pub async fn drop_and_commit<S: BoardStore + ?Sized>(
        &mut self,
        store: &S,
        payload: Option<DragPayload>,
    ) -> Option<Result<()>> {
        let ticket = self.release(payload)?;
        let policy = self.policy;
        let outcome = ticket.commit(store, &policy).await;
        Some(self.settle(ticket, outcome))
    }

    /// Adopt a board pushed by the store after an external change.
    pub fn adopt(&mut self, server: BoardSnapshot) {
        if server.board.id != self.board_id {
            return;
        }
        self.projection.reset(server);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn step(&mut self, event: DragEvent) -> Option<Intent> {
        let next = drag::transition(self.gesture, event);
        if next.state != self.gesture {
            tracing::debug!(from = ?self.gesture, to = ?next.state, "Drag transition");
        }
        self.gesture = next.state;
        next.commit
    }

    fn dragged_task(&self, task_id: i64) -> Option<DraggedTask> {
        let view = self.view();
        let (ci, ti) = view.locate_task(task_id)?;
        Some(DraggedTask {
            task_id,
            column_id: view.columns[ci].column.id,
            index: ti,
        })
    }

    fn resolve(&self, payload: DragPayload) -> Option<DropTarget> {
        let view = self.view();
        match payload {
            DragPayload::Task { task_id } => {
                let (ci, ti) = view.locate_task(task_id)?;
                Some(DropTarget::Task {
                    task_id,
                    column_id: view.columns[ci].column.id,
                    index: ti,
                })
            }
            DragPayload::Column { column_id } => {
                let column = view.column(column_id)?;
                Some(DropTarget::Column {
                    column_id,
                    task_count: column.tasks.len(),
                })
            }
        }
    }

    // A settle during the gesture can move the dragged task out from under it.
    fn applies_to_view(&self, intent: &Intent) -> bool {
        let in_column = |column_id: i64, task_id: i64| {
            self.view()
                .column(column_id)
                .is_some_and(|c| c.tasks.iter().any(|t| t.id == task_id))
        };
        match *intent {
            Intent::Reorder {
                task_id, column_id, ..
            } => in_column(column_id, task_id),
            Intent::Move {
                task_id,
                source_column_id,
                target_column_id,
                ..
            } => {
                in_column(source_column_id, task_id) && self.view().column(target_column_id).is_some()
            }
        }
    }
}

// "Reverted" only when a fresh read showed the store without the change.
fn notice_message(intent: &Intent, err: &BoardError, reverted: bool) -> String {
    let action = match intent {
        Intent::Reorder { task_id, .. } => format!("reorder task {}", task_id),
        Intent::Move { task_id, .. } => format!("move task {}", task_id),
    };
    if reverted {
        format!("Could not {}: {}. Changes were reverted.", action, err)
    } else {
        format!(
            "Could not confirm {}: {}. Showing the last saved board until it reloads.",
            action, err
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::board::db::BoardDb;
    use crate::board::models::NewTask;

    /// Wraps a real store and fails or stalls a configurable number of writes.
    struct FlakyStore {
        db: DbHandle,
        failures: AtomicU32,
        fail_kind: ErrorKind,
        delay: Option<Duration>,
        writes: AtomicU32,
    }

    impl FlakyStore {
        fn new(db: DbHandle) -> Self {
            Self {
                db,
                failures: AtomicU32::new(0),
                fail_kind: ErrorKind::TransactionFailure,
                delay: None,
                writes: AtomicU32::new(0),
            }
        }

        fn failing(db: DbHandle, times: u32, kind: ErrorKind) -> Self {
            Self {
                failures: AtomicU32::new(times),
                fail_kind: kind,
                ..Self::new(db)
            }
        }

        fn stalling(db: DbHandle, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(db)
            }
        }

        fn writes(&self) -> u32 {
            self.writes.load(Ordering::SeqCst)
        }

        async fn gate(&self) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(BoardError::Remote {
                    kind: self.fail_kind,
                    message: "injected failure".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BoardStore for FlakyStore {
        async fn reorder_task(&self, task_id: i64, new_index: usize, column_id: i64) -> Result<()> {
            self.gate().await?;
            self.db.reorder_task(task_id, new_index, column_id).await
        }

        async fn move_task(
            &self,
            task_id: i64,
            source_column_id: i64,
            target_column_id: i64,
            new_index: usize,
        ) -> Result<()> {
            self.gate().await?;
            BoardStore::move_task(&self.db, task_id, source_column_id, target_column_id, new_index)
                .await
        }

        async fn load_board(&self, board_id: i64) -> Result<BoardSnapshot> {
            self.db.load_board(board_id).await
        }
    }

    /// Applies writes at once but answers only after `ack_delay`.
    struct SlowAckStore {
        db: DbHandle,
        ack_delay: Duration,
    }

    #[async_trait]
    impl BoardStore for SlowAckStore {
        async fn reorder_task(&self, task_id: i64, new_index: usize, column_id: i64) -> Result<()> {
            let db = self.db.clone();
            let write = tokio::spawn(async move {
                BoardStore::reorder_task(&db, task_id, new_index, column_id).await
            });
            tokio::time::sleep(self.ack_delay).await;
            write
                .await
                .map_err(|e| BoardError::Other(anyhow::anyhow!("write task failed: {}", e)))?
        }

        async fn move_task(
            &self,
            task_id: i64,
            source_column_id: i64,
            target_column_id: i64,
            new_index: usize,
        ) -> Result<()> {
            BoardStore::move_task(&self.db, task_id, source_column_id, target_column_id, new_index)
                .await
        }

        async fn load_board(&self, board_id: i64) -> Result<BoardSnapshot> {
            self.db.load_board(board_id).await
        }
    }

    /// "To Do" = [T1, T2, T3], "In Progress" = [T4], "Done" empty.
    fn seeded() -> anyhow::Result<(DbHandle, BoardSnapshot)> {
        let db = BoardDb::new_in_memory()?;
        let board = db.create_board("Sprint", None)?;
        let columns = db.list_columns(board.id)?;
        for title in ["T1", "T2", "T3"] {
            db.append_task(columns[0].id, &NewTask::titled(title))?;
        }
        db.append_task(columns[1].id, &NewTask::titled("T4"))?;
        let snapshot = db.get_board_snapshot(board.id)?;
        Ok((DbHandle::new(db), snapshot))
    }

    fn fast_policy() -> CommitPolicy {
        CommitPolicy {
            timeout: Duration::from_millis(500),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn id_of(snap: &BoardSnapshot, title: &str) -> i64 {
        snap.columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .find(|t| t.title == title)
            .map(|t| t.id)
            .unwrap()
    }

    fn titles(snap: &BoardSnapshot, column_index: usize) -> Vec<String> {
        snap.columns[column_index]
            .tasks
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    fn column_id(snap: &BoardSnapshot, column_index: usize) -> i64 {
        snap.columns[column_index].column.id
    }

    fn start_drag(ctl: &mut DragController, task_id: i64) {
        assert!(ctl.pointer_down(task_id, Point::new(0.0, 0.0)));
        ctl.pointer_move(Point::new(12.0, 4.0));
        assert!(ctl.gesture().is_active());
    }

    #[tokio::test]
    async fn test_reorder_drop_applies_optimistically_then_confirms() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::new(db.clone());
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t1 = id_of(&snap, "T1");
        let t3 = id_of(&snap, "T3");

        start_drag(&mut ctl, t1);
        ctl.drag_over(Some(DragPayload::Task { task_id: t3 }));
        assert_eq!(titles(&ctl.preview(), 0), vec!["T2", "T3", "T1"]);
        assert_eq!(titles(ctl.view(), 0), vec!["T1", "T2", "T3"]);

        let ticket = ctl
            .release(Some(DragPayload::Task { task_id: t3 }))
            .expect("reorder should produce a ticket");
        assert_eq!(titles(ctl.view(), 0), vec!["T2", "T3", "T1"]);
        assert_eq!(ctl.projection().pending_count(), 1);

        let outcome = ticket.commit(&store, &ctl.policy()).await;
        ctl.settle(ticket, outcome)?;

        assert_eq!(ctl.projection().pending_count(), 0);
        assert_eq!(ctl.projection().version(), 1);
        assert_eq!(titles(ctl.projection().confirmed(), 0), vec!["T2", "T3", "T1"]);
        let stored = db.load_board(snap.board.id).await?;
        assert_eq!(stored.ordering(), ctl.view().ordering());
        Ok(())
    }

    #[tokio::test]
    async fn test_column_drop_moves_task_to_end() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::new(db.clone());
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t2 = id_of(&snap, "T2");

        start_drag(&mut ctl, t2);
        let in_progress = column_id(&snap, 1);
        let result = ctl
            .drop_and_commit(&store, Some(DragPayload::Column { column_id: in_progress }))
            .await;
        assert!(matches!(result, Some(Ok(()))));

        assert_eq!(titles(ctl.view(), 0), vec!["T1", "T3"]);
        assert_eq!(titles(ctl.view(), 1), vec!["T4", "T2"]);
        let stored = db.load_board(snap.board.id).await?;
        assert_eq!(stored.ordering(), ctl.view().ordering());
        assert_eq!(stored.task(t2).map(|t| t.column_id), Some(in_progress));
        Ok(())
    }

    #[tokio::test]
    async fn test_click_and_cancel_do_not_touch_projection() -> anyhow::Result<()> {
        let (_db, snap) = seeded()?;
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t1 = id_of(&snap, "T1");
        let done = column_id(&snap, 2);

        assert!(ctl.pointer_down(t1, Point::new(0.0, 0.0)));
        ctl.pointer_move(Point::new(1.0, 1.0));
        assert!(ctl.release(Some(DragPayload::Column { column_id: done })).is_none());

        start_drag(&mut ctl, t1);
        ctl.drag_over(Some(DragPayload::Column { column_id: done }));
        assert_eq!(titles(&ctl.preview(), 2), vec!["T1"]);
        ctl.cancel();

        assert_eq!(*ctl.gesture(), DragState::Idle);
        assert_eq!(ctl.view(), &snap);
        assert_eq!(ctl.projection().pending_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_drop_back_on_own_column_is_noop() -> anyhow::Result<()> {
        let (_db, snap) = seeded()?;
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        start_drag(&mut ctl, id_of(&snap, "T2"));
        let own = column_id(&snap, 0);
        assert!(ctl.release(Some(DragPayload::Column { column_id: own })).is_none());
        assert!(ctl.release(None).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_task_cannot_be_picked_up() -> anyhow::Result<()> {
        let (_db, snap) = seeded()?;
        let mut ctl = DragController::new(snap, fast_policy());
        assert!(!ctl.pointer_down(9999, Point::new(0.0, 0.0)));
        assert_eq!(*ctl.gesture(), DragState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_and_queues_notice() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::failing(db.clone(), 1, ErrorKind::NotFound);
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t1 = id_of(&snap, "T1");

        start_drag(&mut ctl, t1);
        let done = column_id(&snap, 2);
        let result = ctl
            .drop_and_commit(&store, Some(DragPayload::Column { column_id: done }))
            .await
            .expect("move should produce a ticket");

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.writes(), 1, "caller errors are not retried");
        assert_eq!(ctl.view().ordering(), snap.ordering());
        assert_eq!(ctl.projection().pending_count(), 0);

        let notices = ctl.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, ErrorKind::NotFound);
        assert!(notices[0].message.contains("Could not move task"));
        assert!(notices[0].message.contains("reverted"));
        assert!(ctl.take_notices().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_failure_is_retried_within_budget() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::failing(db.clone(), 2, ErrorKind::TransactionFailure);
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t3 = id_of(&snap, "T3");
        let t1 = id_of(&snap, "T1");

        start_drag(&mut ctl, t3);
        let result = ctl
            .drop_and_commit(&store, Some(DragPayload::Task { task_id: t1 }))
            .await;
        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(store.writes(), 3);
        assert_eq!(titles(ctl.view(), 0), vec!["T3", "T1", "T2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_rolls_back() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::failing(db.clone(), 10, ErrorKind::TransactionFailure);
        let mut ctl = DragController::new(snap.clone(), fast_policy());

        start_drag(&mut ctl, id_of(&snap, "T3"));
        let t1 = id_of(&snap, "T1");
        let result = ctl
            .drop_and_commit(&store, Some(DragPayload::Task { task_id: t1 }))
            .await
            .expect("reorder should produce a ticket");

        assert_eq!(result.unwrap_err().kind(), ErrorKind::TransactionFailure);
        assert_eq!(store.writes(), 3);
        assert_eq!(ctl.view().ordering(), snap.ordering());
        assert_eq!(ctl.take_notices().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_timeout_surfaces_failure() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::stalling(db.clone(), Duration::from_millis(300));
        let policy = CommitPolicy {
            timeout: Duration::from_millis(20),
            max_attempts: 2,
            retry_backoff: Duration::from_millis(1),
        };
        let mut ctl = DragController::new(snap.clone(), policy);

        start_drag(&mut ctl, id_of(&snap, "T1"));
        let done = column_id(&snap, 2);
        let err = ctl
            .drop_and_commit(&store, Some(DragPayload::Column { column_id: done }))
            .await
            .expect("move should produce a ticket")
            .unwrap_err();

        assert!(matches!(err, BoardError::CommitTimeout { attempts: 2 }));
        assert_eq!(ctl.view().ordering(), snap.ordering());
        let stored = db.load_board(snap.board.id).await?;
        assert_eq!(stored.ordering(), snap.ordering());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_landing_after_timeout_is_confirmed() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let policy = CommitPolicy {
            timeout: Duration::from_millis(60),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        };
        let mut ctl = DragController::new(snap.clone(), policy);
        let t1 = id_of(&snap, "T1");
        let done = column_id(&snap, 2);

        // Hold the connection so the first write queues up behind it and outlives its timeout.
        let holder = db.clone();
        let busy = tokio::spawn(async move {
            holder
                .call(|_| {
                    std::thread::sleep(Duration::from_millis(150));
                    Ok(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        start_drag(&mut ctl, t1);
        let result = ctl
            .drop_and_commit(&db, Some(DragPayload::Column { column_id: done }))
            .await
            .expect("move should produce a ticket");
        busy.await??;

        assert!(result.is_ok(), "stored move reported as {:?}", result);
        assert!(ctl.take_notices().is_empty());
        let stored = db.load_board(snap.board.id).await?;
        assert_eq!(titles(&stored, 2), vec!["T1"]);
        assert_eq!(titles(&stored, 0), vec!["T2", "T3"]);
        assert_eq!(ctl.view().ordering(), stored.ordering());
        assert_eq!(ctl.projection().pending_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_intent_accepts_stored_state_after_timeout() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = SlowAckStore {
            db: db.clone(),
            ack_delay: Duration::from_secs(5),
        };
        let t3 = id_of(&snap, "T3");
        let todo = column_id(&snap, 0);
        let policy = CommitPolicy {
            timeout: Duration::from_millis(40),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(1),
        };

        let intent = Intent::Reorder {
            task_id: t3,
            column_id: todo,
            new_index: 0,
        };
        commit_intent(&store, snap.board.id, intent, &policy).await?;

        let stored = db.load_board(snap.board.id).await?;
        assert_eq!(titles(&stored, 0), vec!["T3", "T1", "T2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_intent_timeout_without_write_fails() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let store = FlakyStore::stalling(db.clone(), Duration::from_millis(200));
        let policy = CommitPolicy {
            timeout: Duration::from_millis(20),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(1),
        };
        let intent = Intent::Reorder {
            task_id: id_of(&snap, "T3"),
            column_id: column_id(&snap, 0),
            new_index: 0,
        };

        let err = commit_intent(&store, snap.board.id, intent, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::CommitTimeout { attempts: 1 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_confirms_error_when_store_has_intent() -> anyhow::Result<()> {
        let (_db, snap) = seeded()?;
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t2 = id_of(&snap, "T2");
        let done = column_id(&snap, 2);

        start_drag(&mut ctl, t2);
        let ticket = ctl
            .release(Some(DragPayload::Column { column_id: done }))
            .expect("move ticket");
        let server = apply_intent(&snap, &ticket.intent);
        let outcome = CommitOutcome {
            result: Err(BoardError::CommitTimeout { attempts: 3 }),
            server: Some(server.clone()),
        };

        ctl.settle(ticket, outcome)?;
        assert!(ctl.take_notices().is_empty());
        assert_eq!(ctl.view().ordering(), server.ordering());
        assert_eq!(ctl.projection().version(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_without_reload_is_not_reported_as_reverted() -> anyhow::Result<()> {
        let (_db, snap) = seeded()?;
        let mut ctl = DragController::new(snap.clone(), fast_policy());

        start_drag(&mut ctl, id_of(&snap, "T1"));
        let ticket = ctl
            .release(Some(DragPayload::Column {
                column_id: column_id(&snap, 1),
            }))
            .expect("move ticket");
        let outcome = CommitOutcome {
            result: Err(BoardError::CommitTimeout { attempts: 3 }),
            server: None,
        };

        assert!(ctl.settle(ticket, outcome).is_err());
        let notices = ctl.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(!notices[0].message.contains("reverted"));
        assert!(notices[0].message.contains("Could not confirm move task"));
        assert_eq!(ctl.view().ordering(), snap.ordering());
        Ok(())
    }

    #[tokio::test]
    async fn test_gestures_continue_while_commit_in_flight() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let healthy = FlakyStore::new(db.clone());
        let broken = FlakyStore::failing(db.clone(), 1, ErrorKind::InvalidArgument);
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t1 = id_of(&snap, "T1");
        let t2 = id_of(&snap, "T2");
        let t4 = id_of(&snap, "T4");
        let done = column_id(&snap, 2);

        start_drag(&mut ctl, t1);
        let first = ctl
            .release(Some(DragPayload::Task { task_id: t2 }))
            .expect("reorder ticket");

        start_drag(&mut ctl, t4);
        let second = ctl
            .release(Some(DragPayload::Column { column_id: done }))
            .expect("move ticket");
        assert_eq!(ctl.projection().pending_count(), 2);
        assert_eq!(titles(ctl.view(), 0), vec!["T2", "T1", "T3"]);
        assert_eq!(titles(ctl.view(), 2), vec!["T4"]);

        // Settle out of order: the later move succeeds, the earlier reorder fails.
        let outcome = second.commit(&healthy, &ctl.policy()).await;
        ctl.settle(second, outcome)?;
        assert_eq!(titles(ctl.view(), 0), vec!["T2", "T1", "T3"]);

        let outcome = first.commit(&broken, &ctl.policy()).await;
        assert!(ctl.settle(first, outcome).is_err());

        assert_eq!(titles(ctl.view(), 0), vec!["T1", "T2", "T3"]);
        assert_eq!(titles(ctl.view(), 1), Vec::<String>::new());
        assert_eq!(titles(ctl.view(), 2), vec!["T4"]);
        assert_eq!(ctl.projection().pending_count(), 0);
        assert_eq!(ctl.view(), ctl.projection().confirmed());
        Ok(())
    }

    #[tokio::test]
    async fn test_adopt_external_change_keeps_pending_intent() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let mut ctl = DragController::new(snap.clone(), fast_policy());
        let t1 = id_of(&snap, "T1");
        let done = column_id(&snap, 2);

        start_drag(&mut ctl, t1);
        let _ticket = ctl
            .release(Some(DragPayload::Column { column_id: done }))
            .expect("move ticket");

        let in_progress = column_id(&snap, 1);
        db.call(move |db| db.append_task(in_progress, &NewTask::titled("T5")).map(|_| ()))
            .await?;
        ctl.adopt(db.load_board(snap.board.id).await?);

        assert_eq!(titles(ctl.view(), 1), vec!["T4", "T5"]);
        assert_eq!(titles(ctl.view(), 2), vec!["T1"]);
        assert_eq!(ctl.projection().pending_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_store_classifies_errors() -> anyhow::Result<()> {
        let (db, snap) = seeded()?;
        let todo = column_id(&snap, 0);
        let err = db.reorder_task(9999, 0, todo).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let t1 = id_of(&snap, "T1");
        let err = db.reorder_task(t1, 3, todo).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = db.load_board(9999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn test_drag_payload_wire_format() {
        let payload: DragPayload = serde_json::from_str(r#"{"type":"task","task_id":3}"#).unwrap();
        assert_eq!(payload, DragPayload::Task { task_id: 3 });
        let json = serde_json::to_value(DragPayload::Column { column_id: 7 }).unwrap();
        assert_eq!(json["type"], "column");
        assert_eq!(json["column_id"], 7);
    }
}
