use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::db::DbHandle;
use super::models::{DEFAULT_COLUMN_COLOR, NewTask};
use super::ws::{self, EventSender, WsMessage, broadcast_change};
use crate::errors::{BoardError, ErrorKind};

/// Board events buffered per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub events: EventSender,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle) -> SharedState {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self { db, events })
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBoardRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateColumnRequest {
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReorderTaskRequest {
    pub column_id: i64,
    pub new_index: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveTaskRequest {
    pub source_column_id: i64,
    pub target_column_id: i64,
    pub new_index: usize,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => ApiError::NotFound(msg),
            ErrorKind::InvalidArgument => ApiError::BadRequest(msg),
            ErrorKind::TransactionFailure => ApiError::Conflict(msg),
            ErrorKind::Internal => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, error) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorKind::NotFound, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorKind::InvalidArgument, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, ErrorKind::TransactionFailure, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal, msg)
            }
        };
        (status, Json(ErrorBody { error, kind })).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/boards", get(list_boards).post(create_board))
        .route("/api/boards/{id}", get(get_board))
        .route("/api/boards/{id}/columns", post(create_column))
        .route("/api/columns/{id}/tasks", post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/reorder", patch(reorder_task))
        .route("/api/tasks/{id}/move", patch(move_task))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_boards(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let boards = state.db.call(|db| db.list_boards()).await?;
    Ok(Json(boards))
}

async fn create_board(
    State(state): State<SharedState>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state
        .db
        .call(move |db| db.create_board(&req.title, req.description.as_deref()))
        .await?;
    broadcast_change(
        &state.events,
        WsMessage::BoardCreated {
            board: board.clone(),
        },
        board.id,
    );
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.db.call(move |db| db.get_board_snapshot(id)).await?;
    Ok(Json(snapshot))
}

async fn create_column(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    Json(req): Json<CreateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let color = req
        .color
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COLUMN_COLOR.to_string());
    let column = state
        .db
        .call(move |db| db.append_column(board_id, &req.title, &color))
        .await?;
    broadcast_change(
        &state.events,
        WsMessage::ColumnCreated {
            column: column.clone(),
        },
        board_id,
    );
    Ok((StatusCode::CREATED, Json(column)))
}

async fn create_task(
    State(state): State<SharedState>,
    Path(column_id): Path<i64>,
    Json(req): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    let (board_id, task) = state
        .db
        .call(move |db| {
            let task = db.append_task(column_id, &req)?;
            let board_id = board_of_column(db, column_id)?;
            Ok((board_id, task))
        })
        .await?;
    broadcast_change(
        &state.events,
        WsMessage::TaskCreated { task: task.clone() },
        board_id,
    );
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .db
        .call(move |db| db.get_task(id)?.ok_or(BoardError::TaskNotFound { id }))
        .await?;
    Ok(Json(task))
}

async fn reorder_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<ReorderTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ReorderTaskRequest {
        column_id,
        new_index,
    } = req;
    let (board_id, task) = state
        .db
        .call(move |db| {
            let task = db.reorder_task(id, new_index, column_id)?;
            Ok((board_of_column(db, column_id)?, task))
        })
        .await?;
    broadcast_change(
        &state.events,
        WsMessage::TaskReordered {
            task_id: id,
            column_id,
            new_index,
        },
        board_id,
    );
    Ok(Json(task))
}

async fn move_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<MoveTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let MoveTaskRequest {
        source_column_id,
        target_column_id,
        new_index,
    } = req;
    let (board_id, task) = state
        .db
        .call(move |db| {
            let task = db.move_task(id, source_column_id, target_column_id, new_index)?;
            Ok((board_of_column(db, target_column_id)?, task))
        })
        .await?;
    broadcast_change(
        &state.events,
        WsMessage::TaskMoved {
            task_id: id,
            source_column_id,
            target_column_id,
            new_index,
        },
        board_id,
    );
    Ok(Json(task))
}

fn board_of_column(db: &super::db::BoardDb, column_id: i64) -> Result<i64, BoardError> {
    db.get_column(column_id)?
        .map(|c| c.board_id)
        .ok_or(BoardError::ColumnNotFound { id: column_id })
}
