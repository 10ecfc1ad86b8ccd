//! Black-box tests against the relay's two WebSocket endpoints, exercising
//! forwarding, auto-attach synthesis, and pending-command failure on
//! extension disconnect. Mirrors the teacher's `mock_chrome.rs` style of
//! driving a server purely through its socket surface.

use cdp_bridge::relay::RelayServer;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str) -> WsClient {
    let (ws, _) = connect_async(url).await.expect("client should connect");
    ws
}

async fn recv_json(ws: &mut WsClient) -> Value {
    let msg = tokio::time::timeout(std::time::Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("valid JSON"),
        other => panic!("expected text frame, got {:?}", other),
    }
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// S1: a forwarded command reaches the extension verbatim and the client
/// receives the extension's reply under the original id.
#[tokio::test]
async fn basic_command_forwarding_round_trips() {
    let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();

    let mut ext = connect(&format!("ws://{}/extension", server.local_addr())).await;
    let mut client = connect(&server.cdp_endpoint()).await;

    send_json(&mut client, json!({"id": 1, "method": "Page.navigate", "params": {"url": "https://example.com"}})).await;

    let forwarded = recv_json(&mut ext).await;
    assert_eq!(forwarded["method"], "forwardCDPCommand");
    let req_id = forwarded["id"].as_u64().unwrap();
    assert_eq!(forwarded["params"]["method"], "Page.navigate");

    send_json(&mut ext, json!({"id": req_id, "result": {"frameId": "F1"}})).await;

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["frameId"], "F1");

    server.shutdown().await.unwrap();
}

/// S3: `Target.setAutoAttach` without a session id triggers an `attachToTab`
/// round trip, then an unsolicited `Target.attachedToTarget` event followed
/// by a bare `{"id":N}` reply with no result/error key.
#[tokio::test]
async fn auto_attach_synthesizes_attached_event_then_bare_reply() {
    let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();

    let mut ext = connect(&format!("ws://{}/extension", server.local_addr())).await;
    let mut client = connect(&server.cdp_endpoint()).await;

    send_json(&mut client, json!({"id": 12, "method": "Target.setAutoAttach", "params": {"autoAttach": true}})).await;

    let attach_req = recv_json(&mut ext).await;
    assert_eq!(attach_req["method"], "attachToTab");
    let req_id = attach_req["id"].as_u64().unwrap();

    send_json(
        &mut ext,
        json!({
            "id": req_id,
            "result": {
                "sessionId": "S1",
                "targetInfo": {"targetId": "T1", "type": "page", "url": "https://chat.openai.com"}
            }
        }),
    )
    .await;

    let attached_event = recv_json(&mut client).await;
    assert_eq!(attached_event["method"], "Target.attachedToTarget");
    assert_eq!(attached_event["params"]["sessionId"], "S1");

    let bare_reply = recv_json(&mut client).await;
    assert_eq!(bare_reply["id"], 12);
    assert!(bare_reply.get("result").is_none());
    assert!(bare_reply.get("error").is_none());

    server.shutdown().await.unwrap();
}

/// Invariant I3(b): pending forwarded commands fail with a descriptive
/// error, surfaced under their original id, when the extension disconnects.
#[tokio::test]
async fn extension_disconnect_fails_pending_command() {
    let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();

    let ext = connect(&format!("ws://{}/extension", server.local_addr())).await;
    let mut client = connect(&server.cdp_endpoint()).await;

    send_json(&mut client, json!({"id": 5, "method": "Runtime.evaluate", "params": {"expression": "1+1"}})).await;

    drop(ext);

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["message"], "WebSocket closed");

    server.shutdown().await.unwrap();
}

/// Events forwarded by the extension arrive on the CDP client unwrapped,
/// tagged with the session id they belong to.
#[tokio::test]
async fn extension_event_forwarding_reaches_client() {
    let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();

    let mut ext = connect(&format!("ws://{}/extension", server.local_addr())).await;
    let mut client = connect(&server.cdp_endpoint()).await;

    send_json(
        &mut ext,
        json!({
            "method": "forwardCDPEvent",
            "params": {
                "sessionId": "S1",
                "method": "Page.loadEventFired",
                "params": {"timestamp": 123.0}
            }
        }),
    )
    .await;

    let event = recv_json(&mut client).await;
    assert_eq!(event["method"], "Page.loadEventFired");
    assert_eq!(event["sessionId"], "S1");
    assert_eq!(event["params"]["timestamp"], 123.0);

    server.shutdown().await.unwrap();
}
