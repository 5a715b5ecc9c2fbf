//! Live feed websocket.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register with the feed hub → send `session:connected`
//! 2. Send `claim:snapshot` with every current claim
//! 3. Forward hub broadcasts (`claim:created`, `claim:avatar`) until close
//! 4. Close → unregister
//!
//! The feed is read-only. Inbound frames other than `feed:ping` get an
//! error reply.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame};
use crate::grid::TOTAL_SLOTS;
use crate::services::feed::CLIENT_CHANNEL_CAPACITY;
use crate::state::AppState;

pub async fn handle_feed(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_feed(socket, state))
}

async fn run_feed(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_CHANNEL_CAPACITY);

    // Join before the snapshot so no claim falls between the two; a claim
    // may then arrive twice, which clients treat as an idempotent upsert.
    state.feed.join(client_id, client_tx).await;
    info!(%client_id, "feed: client connected");

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    let snapshot = snapshot_frame(&state).await;
    let mut open = true;
    for frame in [welcome, snapshot] {
        if send_frame(&mut sink, &frame).await.is_err() {
            open = false;
            break;
        }
    }

    while open {
        tokio::select! {
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let reply = process_inbound_text(client_id, &text);
                        if send_frame(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = client_rx.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    state.feed.part(client_id).await;
    info!(%client_id, "feed: client disconnected");
}

/// Current claims as one `claim:snapshot` frame. Store errors degrade to an
/// error frame; the connection stays up for live updates.
async fn snapshot_frame(state: &AppState) -> Frame {
    let req = Frame::request("claim:snapshot", Data::new());
    match state.claims.list(usize::from(TOTAL_SLOTS)).await {
        Ok(claims) => {
            let mut data = Data::new();
            data.insert("claims".into(), serde_json::to_value(&claims).unwrap_or_default());
            req.item(data)
        }
        Err(e) => {
            warn!(error = %e, "feed: snapshot failed");
            req.error_from(&e)
        }
    }
}

/// Reply for one inbound text frame.
fn process_inbound_text(client_id: Uuid, text: &str) -> Frame {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "feed: invalid inbound frame");
            return Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
        }
    };

    match req.syscall.as_str() {
        "feed:ping" => req.done(),
        other => req.error(format!("feed is read-only; unsupported syscall: {other}")),
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let Ok(json) = serde_json::to_string(frame) else {
        return Err(());
    };
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
