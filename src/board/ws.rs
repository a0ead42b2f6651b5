//! Board change feed over WebSocket.
//!
//! Every successful mutation is published as a [`BoardEvent`]. Clients connect
//! to `/ws` (optionally `/ws?board_id=N` to follow a single board) and receive
//! the typed [`WsMessage`] followed by `BoardInvalidated`, which is their cue
//! to refetch the board and reconcile any optimistic state. A client that
//! falls behind the channel gets `BoardInvalidated` for its board, or
//! `Resync` when it follows every board.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use super::api::SharedState;
use super::models::{Board, Column, Task};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A client that has not answered a ping for this long is dropped.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    BoardCreated {
        board: Board,
    },
    ColumnCreated {
        column: Column,
    },
    TaskCreated {
        task: Task,
    },
    TaskReordered {
        task_id: i64,
        column_id: i64,
        new_index: usize,
    },
    TaskMoved {
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        new_index: usize,
    },
    /// Cached reads of this board are stale and should be refetched.
    BoardInvalidated {
        board_id: i64,
    },
    /// Events were dropped for this connection; refetch every board shown.
    Resync,
}

/// A message tagged with the board it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardEvent {
    pub board_id: i64,
    pub message: WsMessage,
}

pub type EventSender = broadcast::Sender<BoardEvent>;

impl BoardEvent {
    /// Whether a client following `filter` (`None` = all boards) wants this event.
    pub fn concerns(&self, filter: Option<i64>) -> bool {
        filter.is_none_or(|id| id == self.board_id)
    }
}

fn frame(message: &WsMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize WsMessage");
            None
        }
    }
}

/// What the socket loop does with one receive from the event channel.
#[derive(Debug)]
enum Forward {
    Send(Message),
    Skip,
    Stop,
}

fn forward_event(received: Result<BoardEvent, RecvError>, board_filter: Option<i64>) -> Forward {
    let message = match received {
        Ok(event) if event.concerns(board_filter) => event.message,
        Ok(_) => return Forward::Skip,
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, ?board_filter, "WebSocket client lagged behind board events");
            // Missed events are unrecoverable; force a refetch instead.
            match board_filter {
                Some(board_id) => WsMessage::BoardInvalidated { board_id },
                None => WsMessage::Resync,
            }
        }
        Err(RecvError::Closed) => return Forward::Stop,
    };
    match frame(&message) {
        Some(message) => Forward::Send(message),
        None => Forward::Skip,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub board_id: Option<i64>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events, query.board_id))
}

/// Ping bookkeeping for one connection.
#[derive(Debug)]
struct Keepalive {
    last_pong: Instant,
    awaiting_pong: bool,
}

impl Keepalive {
    fn new(now: Instant) -> Self {
        Self {
            last_pong: now,
            awaiting_pong: false,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.awaiting_pong && now.duration_since(self.last_pong) > PONG_TIMEOUT
    }

    fn ping_sent(&mut self) {
        self.awaiting_pong = true;
    }

    fn pong_received(&mut self, now: Instant) {
        self.last_pong = now;
        self.awaiting_pong = false;
    }
}

async fn forward_events(
    socket: WebSocket,
    mut events: broadcast::Receiver<BoardEvent>,
    board_filter: Option<i64>,
) {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut keepalive = Keepalive::new(Instant::now());
    tracing::debug!(?board_filter, "WebSocket client connected");

    loop {
        let outgoing = tokio::select! {
            _ = ticker.tick() => {
                if keepalive.expired(Instant::now()) {
                    tracing::debug!("WebSocket client missed pong, closing");
                    break;
                }
                keepalive.ping_sent();
                Message::Ping(Vec::new().into())
            }

            received = events.recv() => match forward_event(received, board_filter) {
                Forward::Send(message) => message,
                Forward::Skip => continue,
                Forward::Stop => break,
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Pong(_))) => {
                    keepalive.pong_received(Instant::now());
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if sink.send(outgoing).await.is_err() {
            break;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    tracing::debug!(?board_filter, "WebSocket client disconnected");
}

/// Publish `message`, then invalidate `board_id`. Having no subscribers is fine.
pub fn broadcast_change(tx: &EventSender, message: WsMessage, board_id: i64) {
    let _ = tx.send(BoardEvent { board_id, message });
    let _ = tx.send(BoardEvent {
        board_id,
        message: WsMessage::BoardInvalidated { board_id },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::projection::tests::task;

    #[test]
    fn test_ws_message_wire_format() {
        let json = serde_json::to_value(WsMessage::TaskCreated {
            task: task(1, 2, 0, "Test"),
        })
        .unwrap();
        assert_eq!(json["type"], "TaskCreated");
        assert_eq!(json["data"]["task"]["title"], "Test");
        assert_eq!(json["data"]["task"]["priority"], "medium");

        let json = serde_json::to_value(WsMessage::TaskMoved {
            task_id: 5,
            source_column_id: 1,
            target_column_id: 2,
            new_index: 0,
        })
        .unwrap();
        assert_eq!(json["type"], "TaskMoved");
        assert_eq!(json["data"]["target_column_id"], 2);
    }

    #[test]
    fn test_ws_message_deserializes() {
        let json = r#"{"type":"BoardInvalidated","data":{"board_id":7}}"#;
        let msg: WsMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, WsMessage::BoardInvalidated { board_id: 7 });

        let resync = serde_json::to_value(WsMessage::Resync).unwrap();
        assert_eq!(resync["type"], "Resync");
    }

    #[test]
    fn test_event_board_filter() {
        let event = BoardEvent {
            board_id: 3,
            message: WsMessage::BoardInvalidated { board_id: 3 },
        };
        assert!(event.concerns(None));
        assert!(event.concerns(Some(3)));
        assert!(!event.concerns(Some(4)));
    }

    fn sent_message(forward: Forward) -> WsMessage {
        match forward {
            Forward::Send(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    fn invalidation(board_id: i64) -> BoardEvent {
        BoardEvent {
            board_id,
            message: WsMessage::BoardInvalidated { board_id },
        }
    }

    #[tokio::test]
    async fn test_forward_event_filters_by_board() {
        let (tx, mut rx) = broadcast::channel::<BoardEvent>(4);
        tx.send(invalidation(1)).unwrap();
        tx.send(invalidation(2)).unwrap();

        assert!(matches!(forward_event(rx.recv().await, Some(2)), Forward::Skip));
        assert_eq!(
            sent_message(forward_event(rx.recv().await, Some(2))),
            WsMessage::BoardInvalidated { board_id: 2 }
        );
    }

    #[tokio::test]
    async fn test_lagged_unfiltered_client_is_told_to_resync() {
        let (tx, mut rx) = broadcast::channel::<BoardEvent>(1);
        for board_id in 1..=3 {
            tx.send(invalidation(board_id)).unwrap();
        }

        let received = rx.recv().await;
        assert!(matches!(received, Err(RecvError::Lagged(2))));
        assert_eq!(sent_message(forward_event(received, None)), WsMessage::Resync);
        // The newest event is still delivered afterwards.
        assert_eq!(
            sent_message(forward_event(rx.recv().await, None)),
            WsMessage::BoardInvalidated { board_id: 3 }
        );
    }

    #[tokio::test]
    async fn test_lagged_filtered_client_gets_its_board_invalidated() {
        let (tx, mut rx) = broadcast::channel::<BoardEvent>(1);
        tx.send(invalidation(5)).unwrap();
        tx.send(invalidation(6)).unwrap();

        assert_eq!(
            sent_message(forward_event(rx.recv().await, Some(5))),
            WsMessage::BoardInvalidated { board_id: 5 }
        );
    }

    #[tokio::test]
    async fn test_closed_channel_stops_forwarding() {
        let (tx, mut rx) = broadcast::channel::<BoardEvent>(1);
        drop(tx);
        assert!(matches!(forward_event(rx.recv().await, None), Forward::Stop));
    }

    #[test]
    fn test_keepalive_expires_only_while_awaiting_pong() {
        let start = Instant::now();
        let late = start + PONG_TIMEOUT + Duration::from_secs(1);
        let mut keepalive = Keepalive::new(start);
        assert!(!keepalive.expired(late));

        keepalive.ping_sent();
        assert!(!keepalive.expired(start + Duration::from_secs(1)));
        assert!(keepalive.expired(late));

        keepalive.pong_received(late);
        assert!(!keepalive.expired(late + PONG_TIMEOUT));
    }

    #[test]
    fn test_broadcast_without_receivers_is_ok() {
        let (tx, rx) = broadcast::channel::<BoardEvent>(4);
        drop(rx);
        broadcast_change(&tx, WsMessage::BoardInvalidated { board_id: 1 }, 1);
    }

    #[tokio::test]
    async fn test_broadcast_change_sends_invalidation_last() {
        let (tx, mut rx) = broadcast::channel::<BoardEvent>(4);
        broadcast_change(
            &tx,
            WsMessage::TaskReordered {
                task_id: 3,
                column_id: 1,
                new_index: 2,
            },
            9,
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.board_id, 9);
        assert!(matches!(first.message, WsMessage::TaskReordered { task_id: 3, .. }));
        assert_eq!(second.message, WsMessage::BoardInvalidated { board_id: 9 });
    }
}
