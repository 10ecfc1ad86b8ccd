//! CDP WebSocket connection
//!
//! One connection per browser target. Maintains a correlation table of
//! in-flight commands keyed by request id, and broadcasts incoming
//! notifications to any number of event subscribers.

use super::traits::{CdpConnection, CdpError as CdpErrorResponse, CdpEvent, CdpResponse};
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Per-method command timeout
#[derive(Debug, Clone)]
struct CdpTimeoutConfig {
    default_secs: u64,
    navigation_secs: u64,
    execution_secs: u64,
}

impl Default for CdpTimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 30,
            navigation_secs: 60,
            execution_secs: 30,
        }
    }
}

impl CdpTimeoutConfig {
    fn get_timeout_for_command(&self, method: &str) -> tokio::time::Duration {
        let method_lower = method.to_lowercase();

        if method_lower.contains("navigate") || method_lower.contains("reload") {
            return tokio::time::Duration::from_secs(self.navigation_secs);
        }
        if method_lower.starts_with("runtime.") {
            return tokio::time::Duration::from_secs(self.execution_secs);
        }
        tokio::time::Duration::from_secs(self.default_secs)
    }
}

#[derive(Debug)]
struct PendingCommand {
    sender: tokio::sync::oneshot::Sender<CdpResponse>,
    method: String,
}

type WsStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// CDP WebSocket connection implementation
#[derive(Debug)]
pub struct CdpWebSocketConnection {
    url: String,
    ws_stream: Arc<Mutex<Option<WsStream>>>,
    next_id: Arc<AtomicU64>,
    pending_commands: Arc<Mutex<HashMap<u64, PendingCommand>>>,
    event_subscribers: Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<CdpEvent>>>>,
    is_active: Arc<AtomicBool>,
    timeout_config: CdpTimeoutConfig,
}

impl CdpWebSocketConnection {
    /// Connect to a CDP WebSocket target and start its message loop
    pub async fn new<S: Into<String>>(url: S) -> Result<Arc<Self>, Error> {
        let url = url.into();
        info!("connecting CDP websocket to {}", url);

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| Error::websocket(format!("failed to connect to {}: {}", url, e)))?;

        let connection = Arc::new(Self {
            url,
            ws_stream: Arc::new(Mutex::new(Some(ws_stream))),
            next_id: Arc::new(AtomicU64::new(1)),
            pending_commands: Arc::new(Mutex::new(HashMap::new())),
            event_subscribers: Arc::new(Mutex::new(Vec::new())),
            is_active: Arc::new(AtomicBool::new(true)),
            timeout_config: CdpTimeoutConfig::default(),
        });

        let ws_stream = Arc::clone(&connection.ws_stream);
        let pending_commands = Arc::clone(&connection.pending_commands);
        let event_subscribers = Arc::clone(&connection.event_subscribers);
        let is_active = Arc::clone(&connection.is_active);

        tokio::spawn(async move {
            if let Err(e) =
                Self::message_loop(ws_stream, pending_commands, event_subscribers, Arc::clone(&is_active)).await
            {
                error!("CDP message loop error: {}", e);
            }
            is_active.store(false, Ordering::SeqCst);
        });

        Ok(connection)
    }

    /// Message processing loop, run as a background task.
    ///
    /// Uses `try_lock` so it never blocks `send_command` from acquiring the
    /// stream to write a request while the loop is idling on a read.
    async fn message_loop(
        ws_stream: Arc<Mutex<Option<WsStream>>>,
        pending_commands: Arc<Mutex<HashMap<u64, PendingCommand>>>,
        event_subscribers: Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<CdpEvent>>>>,
        is_active: Arc<AtomicBool>,
    ) -> Result<(), Error> {
        while is_active.load(Ordering::SeqCst) {
            let mut guard = match ws_stream.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    continue;
                }
            };

            let stream = match guard.as_mut() {
                Some(stream) => stream,
                None => break,
            };

            let message = tokio::time::timeout(tokio::time::Duration::from_millis(100), stream.next()).await;
            drop(guard);

            match message {
                Ok(Some(Ok(Message::Text(text)))) => {
                    if let Err(e) =
                        Self::handle_message(&text, &pending_commands, &event_subscribers).await
                    {
                        error!("error handling CDP message: {}", e);
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    info!("CDP websocket closed");
                    break;
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    warn!("CDP websocket error: {}", e);
                    break;
                }
                Err(_) => {
                    // short poll timeout, loop again
                }
            }
        }

        Ok(())
    }

    async fn handle_message(
        text: &str,
        pending_commands: &Arc<Mutex<HashMap<u64, PendingCommand>>>,
        event_subscribers: &Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<CdpEvent>>>>,
    ) -> Result<(), Error> {
        if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(text) {
            if response.id != 0 {
                return Self::handle_response(response, pending_commands).await;
            }
        }

        if let Ok(notification) = serde_json::from_str::<CdpNotification>(text) {
            if !notification.method.is_empty() {
                return Self::handle_notification(notification, event_subscribers).await;
            }
        }

        debug!("unrecognized CDP message: {}", text);
        Ok(())
    }

    async fn handle_response(
        response: CdpRpcResponse,
        pending_commands: &Arc<Mutex<HashMap<u64, PendingCommand>>>,
    ) -> Result<(), Error> {
        let mut pending = pending_commands.lock().await;

        if let Some(cmd) = pending.remove(&response.id) {
            debug!("resolving pending command {} ({})", response.id, cmd.method);
            let cdp_response = CdpResponse {
                id: response.id,
                result: Some(response.result),
                error: response.error.map(|e| CdpErrorResponse {
                    message: e.message,
                    code: e.code,
                }),
            };
            let _ = cmd.sender.send(cdp_response);
        } else {
            warn!("response for unknown command id {}", response.id);
        }

        Ok(())
    }

    async fn handle_notification(
        notification: CdpNotification,
        event_subscribers: &Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<CdpEvent>>>>,
    ) -> Result<(), Error> {
        let event = CdpEvent {
            method: notification.method,
            params: notification.params,
            session_id: notification.session_id,
        };

        let mut subscribers = event_subscribers.lock().await;
        let mut dead = Vec::new();
        for (i, sender) in subscribers.iter().enumerate() {
            if sender.send(event.clone()).is_err() {
                dead.push(i);
            }
        }
        for i in dead.into_iter().rev() {
            subscribers.remove(i);
        }

        Ok(())
    }

    async fn send_message(&self, message: Message) -> Result<(), Error> {
        let mut guard = self.ws_stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| Error::websocket("websocket stream not available"))?;
        stream
            .send(message)
            .await
            .map_err(|e| Error::websocket(format!("failed to send message: {}", e)))
    }
}

#[async_trait]
impl CdpConnection for CdpWebSocketConnection {
    async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
        session_id: Option<String>,
    ) -> Result<CdpResponse, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket(format!("connection to {} is not active", self.url)));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
            session_id,
        };

        let json = serde_json::to_string(&request)
            .map_err(|e| Error::cdp(format!("failed to serialize request: {}", e)))?;

        let (sender, receiver) = tokio::sync::oneshot::channel();
        {
            let mut pending = self.pending_commands.lock().await;
            pending.insert(
                id,
                PendingCommand {
                    sender,
                    method: method.to_string(),
                },
            );
        }

        self.send_message(Message::Text(json)).await?;

        let timeout = self.timeout_config.get_timeout_for_command(method);

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => {
                if let Some(err) = &response.error {
                    return Err(Error::cdp(err.message.clone()));
                }
                Ok(response)
            }
            Ok(Err(_)) => Err(Error::websocket("connection closed while awaiting response")),
            Err(_) => {
                self.pending_commands.lock().await.remove(&id);
                Err(Error::timeout(format!("command {} ({}) timed out", id, method)))
            }
        }
    }

    async fn listen_events(&self) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>, Error> {
        let (bounded_tx, bounded_rx) = tokio::sync::mpsc::channel(100);
        let (unbounded_tx, mut unbounded_rx) = tokio::sync::mpsc::unbounded_channel();

        self.event_subscribers.lock().await.push(unbounded_tx);

        tokio::spawn(async move {
            while let Some(event) = unbounded_rx.recv().await {
                if bounded_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(bounded_rx)
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::SeqCst);

        let mut guard = self.ws_stream.lock().await;
        if let Some(stream) = guard.as_mut() {
            let _ = stream.close(None).await;
        }
        *guard = None;

        // fail every pending command
        let mut pending = self.pending_commands.lock().await;
        for (_, cmd) in pending.drain() {
            let _ = cmd.sender.send(CdpResponse {
                id: 0,
                result: None,
                error: Some(CdpErrorResponse {
                    message: "WebSocket closed".to_string(),
                    code: None,
                }),
            });
        }

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_for_navigation() {
        let cfg = CdpTimeoutConfig::default();
        assert_eq!(cfg.get_timeout_for_command("Page.navigate").as_secs(), 60);
        assert_eq!(cfg.get_timeout_for_command("Runtime.evaluate").as_secs(), 30);
        assert_eq!(cfg.get_timeout_for_command("Browser.getVersion").as_secs(), 30);
    }
}
