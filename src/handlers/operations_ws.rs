//! WebSocket handler for real-time operation status streaming
//!
//! Provides `/api/operations/ws` for UI clients to observe operation status
//! changes as they are reconciled, instead of re-fetching the stored record.
//! Clients optionally scope the subscription to one linked business entity.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::entities::operations;
use crate::models::operation::{OperationEvent, OperationResponse, OperationStatus};
use crate::services::poller::PollObserver;
use crate::AppState;

/// Shared state for operation broadcasting
#[derive(Clone)]
pub struct OperationBroadcaster {
    tx: broadcast::Sender<OperationEvent>,
}

impl OperationBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Broadcast an operation event to all subscribers
    pub fn broadcast(&self, event: OperationEvent) {
        // Ignore errors if no subscribers
        let _ = self.tx.send(event);
    }

    /// Subscribe to operation events
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.tx.subscribe()
    }
}

impl Default for OperationBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll observer that pushes completions to WebSocket subscribers
pub struct BroadcastObserver {
    broadcaster: OperationBroadcaster,
}

impl BroadcastObserver {
    pub fn new(broadcaster: OperationBroadcaster) -> Self {
        Self { broadcaster }
    }
}

impl PollObserver for BroadcastObserver {
    fn on_complete(&self, operation: &operations::Model) {
        self.broadcaster.broadcast(OperationEvent::from_model(operation));
    }

    fn on_error(&self, operation_id: &str, message: &str) {
        // The stored status did not change; subscribers learn nothing new
        error!("Operation {} polling failed: {}", operation_id, message);
    }

    fn on_timeout(&self, operation_id: &str) {
        warn!(
            "Operation {} exhausted poll attempts, awaiting webhook or manual resume",
            operation_id
        );
    }
}

/// WebSocket subscription request from client
#[derive(Debug, Clone, Deserialize)]
pub struct WsSubscribeRequest {
    /// Action type (subscribe, unsubscribe, ping)
    pub action: String,
    /// Optional linked entity to filter events (absent = all operations)
    pub linked_entity_id: Option<String>,
}

/// WebSocket message to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    /// Subscription confirmed
    #[serde(rename = "subscribed")]
    Subscribed { linked_entity_id: Option<String> },
    /// Operation status update
    #[serde(rename = "operation")]
    Operation(OperationEvent),
    /// Error message
    #[serde(rename = "error")]
    Error { message: String },
    /// Pong response
    #[serde(rename = "pong")]
    Pong,
    /// Initial state with in-flight operations
    #[serde(rename = "initial")]
    Initial { operations: Vec<OperationResponse> },
}

/// GET /api/operations/ws - WebSocket endpoint for operation status streaming
pub async fn operations_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!("New operations WebSocket connection");

    // Wait for subscription request
    let filter = match wait_for_subscription(&mut receiver).await {
        Ok(filter) => filter,
        Err(e) => {
            let _ = sender
                .send(Message::Text(
                    serde_json::to_string(&WsMessage::Error {
                        message: e.to_string(),
                    })
                    .unwrap()
                    .into(),
                ))
                .await;
            return;
        }
    };

    info!("Operations subscription (filter: {:?})", filter);

    // Send subscription confirmation
    let _ = sender
        .send(Message::Text(
            serde_json::to_string(&WsMessage::Subscribed {
                linked_entity_id: filter.clone(),
            })
            .unwrap()
            .into(),
        ))
        .await;

    // Send initial state - operations still waiting on the provider
    let mut query = operations::Entity::find()
        .filter(operations::Column::Status.is_not_in(OperationStatus::terminal_strings()));
    if let Some(ref linked) = filter {
        query = query.filter(operations::Column::LinkedEntityId.eq(linked));
    }
    if let Ok(in_flight) = query
        .order_by_desc(operations::Column::CreatedAt)
        .all(&state.db)
        .await
    {
        let response: Vec<OperationResponse> = in_flight.into_iter().map(Into::into).collect();
        let _ = sender
            .send(Message::Text(
                serde_json::to_string(&WsMessage::Initial {
                    operations: response,
                })
                .unwrap()
                .into(),
            ))
            .await;
    }

    // Subscribe to broadcast channel
    let mut broadcast_rx = state.operation_broadcaster.subscribe();

    // Heartbeat interval
    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            // Handle broadcast events
            result = broadcast_rx.recv() => {
                match result {
                    Ok(event) => {
                        let matches = filter
                            .as_deref()
                            .is_none_or(|linked| event.linked_entity_id.as_deref() == Some(linked));
                        if matches {
                            let msg = WsMessage::Operation(event);
                            if let Err(e) = sender.send(Message::Text(
                                serde_json::to_string(&msg).unwrap().into()
                            )).await {
                                debug!("WebSocket send error: {}", e);
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} broadcast events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcast channel closed");
                        break;
                    }
                }
            }

            // Handle heartbeat
            _ = heartbeat.tick() => {
                if let Err(e) = sender.send(Message::Ping(axum::body::Bytes::new())).await {
                    debug!("Heartbeat failed: {}", e);
                    break;
                }
            }

            // Handle incoming messages
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(req) = serde_json::from_str::<WsSubscribeRequest>(&text) {
                            match req.action.as_str() {
                                "ping" => {
                                    let _ = sender.send(Message::Text(
                                        serde_json::to_string(&WsMessage::Pong).unwrap().into()
                                    )).await;
                                }
                                "unsubscribe" => {
                                    info!("Client unsubscribed");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Operations WebSocket connection closed");
}

async fn wait_for_subscription(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
    // Wait up to 30 seconds for subscription request
    let timeout = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let req: WsSubscribeRequest = serde_json::from_str(&text)?;

                    if req.action != "subscribe" {
                        return Err("First message must be subscribe action".into());
                    }

                    return Ok(req.linked_entity_id);
                }
                Ok(Message::Ping(_)) => {
                    continue;
                }
                Ok(Message::Close(_)) => {
                    return Err("Connection closed before subscription".into());
                }
                Err(e) => {
                    return Err(format!("WebSocket error: {}", e).into());
                }
                _ => continue,
            }
        }
        Err("Connection ended before subscription".into())
    });

    timeout.await.map_err(|_| "Subscription timeout")?
}
