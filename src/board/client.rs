//! HTTP client for a running board server.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api::{CreateBoardRequest, CreateColumnRequest, ErrorBody, MoveTaskRequest, ReorderTaskRequest};
use super::controller::BoardStore;
use super::models::{Board, BoardSnapshot, Column, NewTask, Task};
use crate::errors::{BoardError, ErrorKind, Result};

/// [`BoardStore`] backed by the server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpBoardStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBoardStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_boards(&self) -> Result<Vec<Board>> {
        self.get("/api/boards").await
    }

    pub async fn create_board(&self, title: &str, description: Option<&str>) -> Result<Board> {
        let body = CreateBoardRequest {
            title: title.to_string(),
            description: description.map(str::to_string),
        };
        self.send_json(reqwest::Method::POST, "/api/boards", &body).await
    }

    pub async fn create_column(&self, board_id: i64, title: &str, color: Option<&str>) -> Result<Column> {
        let body = CreateColumnRequest {
            title: title.to_string(),
            color: color.map(str::to_string),
        };
        let path = format!("/api/boards/{}/columns", board_id);
        self.send_json(reqwest::Method::POST, &path, &body).await
    }

    pub async fn create_task(&self, column_id: i64, task: &NewTask) -> Result<Task> {
        let path = format!("/api/columns/{}/tasks", column_id);
        self.send_json(reqwest::Method::POST, &path, task).await
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Task> {
        self.get(&format!("/api/tasks/{}", task_id)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.get(self.url(path));
        self.execute(request).await
    }

    async fn send_json<B, T>(&self, method: reqwest::Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.request(method, self.url(path)).json(body);
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let resp = request.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(transport_error);
        }

        let text = resp.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => BoardError::Remote {
                kind: body.kind,
                message: body.error,
            },
            Err(_) => BoardError::Remote {
                kind: kind_for_status(status),
                message: format!("Server returned {}: {}", status, text.trim()),
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl BoardStore for HttpBoardStore {
    async fn reorder_task(&self, task_id: i64, new_index: usize, column_id: i64) -> Result<()> {
        let path = format!("/api/tasks/{}/reorder", task_id);
        let body = ReorderTaskRequest {
            column_id,
            new_index,
        };
        let _: Task = self.send_json(reqwest::Method::PATCH, &path, &body).await?;
        Ok(())
    }

    async fn move_task(
        &self,
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        new_index: usize,
    ) -> Result<()> {
        let path = format!("/api/tasks/{}/move", task_id);
        let body = MoveTaskRequest {
            source_column_id,
            target_column_id,
            new_index,
        };
        let _: Task = self.send_json(reqwest::Method::PATCH, &path, &body).await?;
        Ok(())
    }

    async fn load_board(&self, board_id: i64) -> Result<BoardSnapshot> {
        self.get(&format!("/api/boards/{}", board_id)).await
    }
}

/// Unreachable servers and timeouts are worth retrying; anything else is not.
fn transport_error(err: reqwest::Error) -> BoardError {
    let kind = if err.is_connect() || err.is_timeout() {
        ErrorKind::TransactionFailure
    } else {
        ErrorKind::Internal
    };
    BoardError::Remote {
        kind,
        message: format!("Request failed: {}", err),
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::InvalidArgument,
        StatusCode::CONFLICT | StatusCode::SERVICE_UNAVAILABLE => ErrorKind::TransactionFailure,
        _ => ErrorKind::Internal,
    }
}
