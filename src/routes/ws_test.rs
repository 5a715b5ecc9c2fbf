use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::*;
use crate::frame::Status;
use crate::routes::test_server;
use crate::services::claim::{self, ClaimRequest};
use crate::services::claim_store::MemoryClaimStore;
use crate::services::mask::SlotMask;
use crate::state::test_helpers;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(state: AppState) -> WsStream {
    let avatar_dir = std::env::temp_dir().join(format!("mosaic-ws-{}", Uuid::new_v4()));
    let addr = test_server::spawn(state, avatar_dir).await;
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/feed"))
        .await
        .expect("websocket connect");
    ws
}

async fn next_frame(ws: &mut WsStream) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("feed receive timed out")
            .expect("feed closed")
            .expect("feed error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

fn claim_request(slot: i64, handle: &str) -> ClaimRequest {
    ClaimRequest { slot, handle: handle.into(), ..ClaimRequest::default() }
}

// =============================================================================
// process_inbound_text
// =============================================================================

#[test]
fn ping_gets_done_reply() {
    let ping = Frame::request("feed:ping", Data::new());
    let text = serde_json::to_string(&ping).unwrap();

    let reply = process_inbound_text(Uuid::new_v4(), &text);
    assert_eq!(reply.status, Status::Done);
    assert_eq!(reply.parent_id, Some(ping.id));
    assert_eq!(reply.syscall, "feed:ping");
}

#[test]
fn other_syscalls_are_rejected() {
    let req = Frame::request("claim:create", Data::new());
    let reply = process_inbound_text(Uuid::new_v4(), &serde_json::to_string(&req).unwrap());
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.parent_id, Some(req.id));
    let message = reply.data.get("message").and_then(|v| v.as_str()).unwrap();
    assert!(message.contains("claim:create"));
}

#[test]
fn invalid_json_yields_gateway_error() {
    let reply = process_inbound_text(Uuid::new_v4(), "{not json");
    assert_eq!(reply.syscall, "gateway:error");
    assert!(reply.parent_id.is_none());
    assert!(reply.data.contains_key("message"));
}

// =============================================================================
// snapshot_frame
// =============================================================================

#[tokio::test]
async fn snapshot_lists_existing_claims() {
    let state = test_helpers::test_app_state();
    claim::submit_claim(&state, claim_request(1, "alice")).await.unwrap();
    claim::submit_claim(&state, claim_request(2, "bob")).await.unwrap();

    let frame = snapshot_frame(&state).await;
    assert_eq!(frame.syscall, "claim:snapshot");
    assert_eq!(frame.status, Status::Item);
    let claims = frame.data.get("claims").and_then(|v| v.as_array()).unwrap();
    assert_eq!(claims.len(), 2);
}

// =============================================================================
// end to end
// =============================================================================

#[tokio::test]
async fn connect_receives_session_and_snapshot() {
    let state = test_helpers::test_app_state();
    claim::submit_claim(&state, claim_request(9, "alice")).await.unwrap();
    let mut ws = connect(state).await;

    let hello = next_frame(&mut ws).await;
    assert_eq!(hello.syscall, "session:connected");
    assert!(hello.data.get("client_id").and_then(|v| v.as_str()).is_some());

    let snapshot = next_frame(&mut ws).await;
    assert_eq!(snapshot.syscall, "claim:snapshot");
    let claims = snapshot.data.get("claims").and_then(|v| v.as_array()).unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].get("slot").and_then(serde_json::Value::as_i64), Some(9));
}

#[tokio::test]
async fn new_claims_are_pushed_to_connected_clients() {
    let state = test_helpers::test_app_state_with(Arc::new(MemoryClaimStore::new()), SlotMask::all_eligible());
    let mut ws = connect(state.clone()).await;
    next_frame(&mut ws).await;
    next_frame(&mut ws).await;

    claim::submit_claim(&state, claim_request(77, "carol")).await.unwrap();

    let pushed = next_frame(&mut ws).await;
    assert_eq!(pushed.syscall, "claim:created");
    let claim = pushed.data.get("claim").unwrap();
    assert_eq!(claim.get("handle_id").and_then(|v| v.as_str()), Some("carol"));
}

#[tokio::test]
async fn ping_over_socket_is_answered() {
    let mut ws = connect(test_helpers::test_app_state()).await;
    next_frame(&mut ws).await;
    next_frame(&mut ws).await;

    let ping = Frame::request("feed:ping", Data::new());
    ws.send(WsMessage::Text(serde_json::to_string(&ping).unwrap().into()))
        .await
        .unwrap();

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply.status, Status::Done);
    assert_eq!(reply.parent_id, Some(ping.id));
}

#[tokio::test]
async fn closing_socket_leaves_the_hub() {
    let state = test_helpers::test_app_state();
    let mut ws = connect(state.clone()).await;
    next_frame(&mut ws).await;
    assert_eq!(state.feed.client_count().await, 1);

    ws.close(None).await.unwrap();
    for _ in 0..50 {
        if state.feed.client_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("client still registered after close");
}
