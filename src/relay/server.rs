//! CDP Relay Server: a two-endpoint WebSocket server that bridges a CDP
//! client to a browser extension, intercepting a small command table and
//! synthesizing auto-attach notifications.
//!
//! Built on `axum`'s `ws` feature for the socket plumbing; the extension
//! correlation table and close-drains-pending behavior follow the teacher's
//! `cdp::connection::CdpWebSocketConnection`, generalized from one peer to
//! two.

use super::state::{RelayState, TargetAttachment};
use crate::Error;
use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::State,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

const CLOSE_SUPERSEDED: u16 = 1000;
const CLOSE_INVALID_PATH: u16 = 4004;
const EXTENSION_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Intercepted-method literals, per spec §4.1's command interception table.
/// Frames whose `params.method` forwarded to the extension equals one of
/// these would violate invariant I4 — they are answered locally instead.
const INTERCEPTED_METHODS: &[&str] = &[
    "Browser.getVersion",
    "Browser.setDownloadBehavior",
    "Target.getTargetInfo",
];

#[derive(Clone)]
struct AppState {
    relay: Arc<RelayState>,
    cdp_slot: Arc<Mutex<Option<UnboundedSender<Message>>>>,
    ext_slot: Arc<Mutex<Option<UnboundedSender<Message>>>>,
}

/// A running relay server instance. Dropping this does not stop the
/// server — call `shutdown` for a graceful stop.
#[derive(Debug)]
pub struct RelayServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    join_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RelayServer {
    /// Bind on `host:port` (port 0 lets the OS assign one) and start
    /// serving. Resolves the cyclic relay/factory dependency: the caller
    /// reads `local_addr()` only after this returns, so a relay-backed
    /// context can discover its own `/cdp` URL before connecting to it.
    pub async fn bind(host: &str, port: u16) -> Result<Self, Error> {
        let listener = TcpListener::bind(format!("{}:{}", host, port))
            .await
            .map_err(|e| Error::internal(format!("failed to bind relay listener: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::internal(format!("failed to read relay local address: {}", e)))?;

        let state = AppState {
            relay: RelayState::new(),
            cdp_slot: Arc::new(Mutex::new(None)),
            ext_slot: Arc::new(Mutex::new(None)),
        };

        let app = Router::new()
            .route("/cdp", get(cdp_upgrade))
            .route("/extension", get(extension_upgrade))
            .fallback(invalid_path_upgrade)
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let join_handle = tokio::spawn(async move {
            let server = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!("relay server exited with error: {}", e);
            }
        });

        info!("CDP relay listening on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn cdp_endpoint(&self) -> String {
        format!("ws://{}/cdp", self.local_addr)
    }

    pub async fn shutdown(mut self) -> Result<(), Error> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

async fn cdp_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_cdp_socket(socket, state))
}

async fn extension_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_extension_socket(socket, state))
}

async fn invalid_path_upgrade(ws: WebSocketUpgrade) -> axum::response::Response {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_INVALID_PATH,
                reason: "Invalid path".into(),
            })))
            .await;
    })
}

/// Replace whatever sender currently occupies `slot` with `new_tx`,
/// superseding the old connection with close code 1000. Returns once the
/// supersede frame has been queued, before the caller processes any new
/// traffic — this is what gives boundary behavior B3 its ordering.
fn supersede(slot: &Mutex<Option<UnboundedSender<Message>>>, new_tx: UnboundedSender<Message>) {
    let mut guard = slot.lock().unwrap();
    if let Some(old_tx) = guard.take() {
        let _ = old_tx.send(Message::Close(Some(CloseFrame {
            code: CLOSE_SUPERSEDED,
            reason: "New connection established".into(),
        })));
    }
    *guard = Some(new_tx);
}

fn clear_if_current(slot: &Mutex<Option<UnboundedSender<Message>>>, tx: &UnboundedSender<Message>) {
    let mut guard = slot.lock().unwrap();
    if let Some(current) = guard.as_ref() {
        if current.same_channel(tx) {
            *guard = None;
        }
    }
}

async fn handle_cdp_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    supersede(&state.cdp_slot, tx.clone());
    debug!("CDP client connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_client_frame(&state, &tx, &text).await {
                    warn!("malformed CDP client frame, closing socket: {}", e);
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("CDP client socket error: {}", e);
                break;
            }
        }
    }

    clear_if_current(&state.cdp_slot, &tx);
    if let Some(ext_tx) = state.ext_slot.lock().unwrap().clone() {
        send_json(&ext_tx, json!({ "id": state.relay.next_id(), "method": "detachFromTab" }));
    }
    writer.abort();
    debug!("CDP client disconnected");
}

async fn handle_extension_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    supersede(&state.ext_slot, tx.clone());
    state.relay.connected.mark_connected();
    info!("extension peer attached");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match handle_extension_frame(&state, &text).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    warn!("malformed extension frame, closing socket: {}", e);
                    break;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("extension socket error: {}", e);
                break;
            }
        }
    }

    clear_if_current(&state.ext_slot, &tx);
    state.relay.connected.mark_disconnected();
    *state.relay.attachment.write().await = None;
    state.relay.fail_all_pending("WebSocket closed").await;
    writer.abort();
    info!("extension peer detached");
}

/// Dispatch one client-originated frame. Returns `Err` only for malformed
/// JSON, which closes the socket (fail-fast per spec §4.1 failure
/// semantics).
async fn handle_client_frame(state: &AppState, reply_tx: &UnboundedSender<Message>, text: &str) -> Result<(), String> {
    let frame: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let id = frame.get("id").and_then(|v| v.as_u64());
    let method = frame.get("method").and_then(|v| v.as_str());
    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    let session_id = frame.get("sessionId").and_then(|v| v.as_str()).map(|s| s.to_string());

    let (id, method) = match (id, method) {
        (Some(id), Some(method)) => (id, method.to_string()),
        _ => return Err("frame missing id or method".to_string()),
    };

    match method.as_str() {
        "Browser.getVersion" => {
            send_json(
                reply_tx,
                json!({
                    "id": id,
                    "result": {
                        "protocolVersion": "1.3",
                        "product": "Chrome/Bridge",
                        "userAgent": "CDP-Bridge/1.0",
                    }
                }),
            );
        }
        "Browser.setDownloadBehavior" => {
            send_json(reply_tx, json!({ "id": id, "result": {} }));
        }
        "Target.setAutoAttach" if session_id.is_none() => {
            handle_auto_attach(state, reply_tx, id, params).await;
        }
        "Target.getTargetInfo" => {
            let attachment = state.relay.attachment.read().await;
            match attachment.as_ref() {
                Some(a) => send_json(reply_tx, json!({ "id": id, "result": a.target_info.clone() })),
                None => send_json(
                    reply_tx,
                    json!({ "id": id, "error": { "message": "no target attached" } }),
                ),
            }
        }
        _ => {
            forward_to_extension(state, reply_tx, id, &method, params, session_id).await;
        }
    }

    Ok(())
}

async fn handle_auto_attach(state: &AppState, reply_tx: &UnboundedSender<Message>, id: u64, params: Value) {
    state.relay.connected.wait_connected().await;

    let ext_tx = match state.ext_slot.lock().unwrap().clone() {
        Some(tx) => tx,
        None => {
            send_json(
                reply_tx,
                json!({ "id": id, "error": { "message": "Extension disconnected before command could be processed" } }),
            );
            return;
        }
    };

    let req_id = state.relay.next_id();
    let (tx, rx) = tokio::sync::oneshot::channel();
    state.relay.pending.lock().await.insert(req_id, tx);

    send_json(&ext_tx, json!({ "id": req_id, "method": "attachToTab", "params": params }));

    let outcome = tokio::time::timeout(EXTENSION_REPLY_TIMEOUT, rx).await;
    let reply = match outcome {
        Ok(Ok(Ok(value))) => value,
        Ok(Ok(Err(reason))) => {
            send_json(reply_tx, json!({ "id": id, "error": { "message": reason } }));
            return;
        }
        _ => {
            state.relay.pending.lock().await.remove(&req_id);
            send_json(reply_tx, json!({ "id": id, "error": { "message": "attachToTab timed out" } }));
            return;
        }
    };

    let session_id = match reply.get("sessionId").and_then(|v| v.as_str()) {
        Some(s) => s.to_string(),
        None => {
            send_json(reply_tx, json!({ "id": id, "error": { "message": "attachToTab reply missing sessionId" } }));
            return;
        }
    };
    let mut target_info = reply.get("targetInfo").cloned().unwrap_or(json!({}));
    if let Some(obj) = target_info.as_object_mut() {
        obj.insert("attached".to_string(), Value::Bool(true));
    }

    *state.relay.attachment.write().await = Some(TargetAttachment {
        session_id: session_id.clone(),
        target_info: target_info.clone(),
    });

    send_json(
        reply_tx,
        json!({
            "method": "Target.attachedToTarget",
            "params": {
                "sessionId": session_id,
                "targetInfo": target_info,
                "waitingForDebugger": false,
            }
        }),
    );

    send_json(reply_tx, json!({ "id": id }));
}

async fn forward_to_extension(
    state: &AppState,
    reply_tx: &UnboundedSender<Message>,
    id: u64,
    method: &str,
    params: Value,
    session_id: Option<String>,
) {
    state.relay.connected.wait_connected().await;

    let ext_tx = match state.ext_slot.lock().unwrap().clone() {
        Some(tx) => tx,
        None => {
            send_json(
                reply_tx,
                json!({ "id": id, "error": { "message": "Extension disconnected before command could be processed" } }),
            );
            return;
        }
    };

    debug_assert!(!INTERCEPTED_METHODS.contains(&method));

    let req_id = state.relay.next_id();
    let (tx, rx) = tokio::sync::oneshot::channel();
    state.relay.pending.lock().await.insert(req_id, tx);

    send_json(
        &ext_tx,
        json!({
            "id": req_id,
            "method": "forwardCDPCommand",
            "params": { "sessionId": session_id, "method": method, "params": params },
        }),
    );

    let outcome = tokio::time::timeout(EXTENSION_REPLY_TIMEOUT, rx).await;
    match outcome {
        Ok(Ok(Ok(result))) => send_json(reply_tx, json!({ "id": id, "result": result })),
        Ok(Ok(Err(reason))) => send_json(reply_tx, json!({ "id": id, "error": { "message": reason } })),
        _ => {
            state.relay.pending.lock().await.remove(&req_id);
            send_json(reply_tx, json!({ "id": id, "error": { "message": "forwarded command timed out" } }));
        }
    }
}

/// Dispatch one extension-originated frame: a correlated reply, or an
/// unsolicited `forwardCDPEvent`/`detachedFromTab` notification.
///
/// Returns `Ok(true)` when the caller should tear the extension socket down
/// (the IDLE→waiting reset spec §4.1 requires after `detachedFromTab`), and
/// `Ok(false)` otherwise.
async fn handle_extension_frame(state: &AppState, text: &str) -> Result<bool, String> {
    let frame: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;

    if let Some(id) = frame.get("id").and_then(|v| v.as_u64()) {
        let mut pending = state.relay.pending.lock().await;
        if let Some(sender) = pending.remove(&id) {
            let outcome = if let Some(error) = frame.get("error") {
                let message = error
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("extension command failed")
                    .to_string();
                Err(message)
            } else {
                Ok(frame.get("result").cloned().unwrap_or(Value::Null))
            };
            let _ = sender.send(outcome);
        } else {
            warn!("extension reply for unknown id {}", id);
        }
        return Ok(false);
    }

    match frame.get("method").and_then(|v| v.as_str()) {
        Some("forwardCDPEvent") => {
            let params = frame.get("params").cloned().unwrap_or(Value::Null);
            let session_id = params.get("sessionId").cloned().unwrap_or(Value::Null);
            let inner_method = params.get("method").cloned().unwrap_or(Value::Null);
            let inner_params = params.get("params").cloned().unwrap_or(Value::Null);

            if let Some(cdp_tx) = state.cdp_slot.lock().unwrap().clone() {
                send_json(
                    &cdp_tx,
                    json!({ "method": inner_method, "params": inner_params, "sessionId": session_id }),
                );
            } else {
                debug!("dropping forwardCDPEvent: no CDP client attached");
            }
        }
        Some("detachedFromTab") => {
            debug!("extension reported detachedFromTab, tearing down extension socket");
            return Ok(true);
        }
        other => {
            debug!("unrecognized extension frame method: {:?}", other);
        }
    }

    Ok(false)
}

fn send_json(tx: &UnboundedSender<Message>, value: Value) {
    if let Ok(text) = serde_json::to_string(&value) {
        let _ = tx.send(Message::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt as _;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as TMessage;

    async fn connect(url: &str) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
        let (ws, _) = connect_async(url).await.expect("connect");
        ws
    }

    #[tokio::test]
    async fn test_intercepted_get_version_before_extension() {
        let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();
        let url = server.cdp_endpoint();

        let mut client = connect(&url).await;
        client
            .send(TMessage::Text(r#"{"id":7,"method":"Browser.getVersion"}"#.to_string()))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        if let TMessage::Text(text) = reply {
            let value: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["id"], 7);
            assert_eq!(value["result"]["product"], "Chrome/Bridge");
        } else {
            panic!("expected text frame");
        }

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_path_closes_with_4004() {
        let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();
        let url = format!("ws://{}/not-a-real-path", server.local_addr());

        let mut client = connect(&url).await;
        let reply = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        match reply {
            TMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), CLOSE_INVALID_PATH),
            other => panic!("expected close frame, got {:?}", other),
        }

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_cdp_connection_supersedes_first() {
        let server = RelayServer::bind("127.0.0.1", 0).await.unwrap();
        let url = server.cdp_endpoint();

        let mut first = connect(&url).await;
        let _second = connect(&url).await;

        let reply = tokio::time::timeout(Duration::from_secs(2), first.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        match reply {
            TMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), CLOSE_SUPERSEDED),
            other => panic!("expected close frame, got {:?}", other),
        }

        server.shutdown().await.unwrap();
    }
}
