// WebSocket stream of annotated frames, telemetry and logs

use crate::dashboard::{DashboardFrame, DashboardState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: DashboardState) {
    info!("Dashboard client connected");

    let mut frames = state.subscribe();
    let (mut sender, mut receiver) = socket.split();

    if let Some(latest) = state.latest() {
        if send_frame(&mut sender, &latest).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if send_frame(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Dashboard client lagging, skipped {} frames", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }

    info!("Dashboard client disconnected");
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Arc<DashboardFrame>) -> Result<(), ()> {
    let json = match serde_json::to_string(frame.as_ref()) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize dashboard frame: {}", e);
            return Ok(());
        }
    };

    sender.send(Message::Text(json)).await.map_err(|_| ())
}
