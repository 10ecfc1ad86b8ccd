//! CDP client implementation
//!
//! High-level, typed wrapper over a raw `CdpConnection`.

use super::traits::*;
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// CDP client implementation
#[derive(Debug, Clone)]
pub struct CdpClientImpl {
    connection: Arc<dyn CdpConnection>,
    session_id: Option<String>,
}

impl CdpClientImpl {
    /// Create a client addressing the connection's own top-level target.
    pub fn new(connection: Arc<dyn CdpConnection>) -> Self {
        Self {
            connection,
            session_id: None,
        }
    }

    /// Create a client addressing a flattened session on a shared connection
    /// (relay auto-attach forwarding).
    pub fn with_session(connection: Arc<dyn CdpConnection>, session_id: String) -> Self {
        Self {
            connection,
            session_id: Some(session_id),
        }
    }

    fn parse_remote_object(obj: &RemoteObject) -> EvaluationResult {
        match obj.r#type.as_str() {
            "string" => EvaluationResult::String(
                obj.value.as_ref().and_then(|v| v.as_str()).unwrap_or("").to_string(),
            ),
            "number" => EvaluationResult::Number(obj.value.as_ref().and_then(|v| v.as_f64()).unwrap_or(0.0)),
            "boolean" => EvaluationResult::Bool(obj.value.as_ref().and_then(|v| v.as_bool()).unwrap_or(false)),
            "undefined" | "null" => EvaluationResult::Null,
            _ => EvaluationResult::Object(obj.value.clone().unwrap_or(serde_json::Value::Null)),
        }
    }
}

#[async_trait]
impl CdpClient for CdpClientImpl {
    fn connection(&self) -> Arc<dyn CdpConnection> {
        Arc::clone(&self.connection)
    }

    #[instrument(skip(self))]
    async fn navigate(&self, url: &str) -> Result<NavigationResult, Error> {
        info!("navigating to {}", url);

        let params = NavigateParams {
            url: url.to_string(),
            referrer: None,
        };

        self.call_method(
            "Page.navigate",
            serde_json::to_value(params).map_err(|e| Error::cdp(e.to_string()))?,
        )
        .await
        .map_err(|e| Error::navigation_failed(format!("Page.navigate failed: {}", e)))?;

        // Poll document.readyState rather than relying on load events, which
        // can race with the command response.
        for attempt in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

            match self.evaluate("document.readyState", false).await {
                Ok(EvaluationResult::String(state)) if state == "complete" || state == "interactive" => {
                    debug!("page reached {} on attempt {}", state, attempt + 1);
                    break;
                }
                _ => continue,
            }
        }

        Ok(NavigationResult { url: url.to_string() })
    }

    #[instrument(skip(self, script))]
    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult, Error> {
        let params = EvaluateParams {
            expression: script.to_string(),
            await_promise: Some(await_promise),
            return_by_value: Some(true),
        };

        let result = self
            .call_method(
                "Runtime.evaluate",
                serde_json::to_value(params).map_err(|e| Error::cdp(e.to_string()))?,
            )
            .await?;

        let eval_response: EvaluateResponse =
            serde_json::from_value(result).map_err(|e| Error::cdp(format!("bad evaluate response: {}", e)))?;

        if let Some(exception) = eval_response.exception_details {
            return Err(Error::cdp(
                exception.text.unwrap_or_else(|| "script evaluation failed".to_string()),
            ));
        }

        Ok(Self::parse_remote_object(&eval_response.result))
    }

    async fn get_content(&self) -> Result<String, Error> {
        match self.evaluate("document.documentElement.outerHTML", false).await? {
            EvaluationResult::String(html) => Ok(html),
            _ => Ok(String::new()),
        }
    }

    async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        let method = format!("{}.enable", domain);
        self.call_method(&method, serde_json::json!({})).await?;
        Ok(())
    }

    async fn call_method(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, Error> {
        let response = self
            .connection
            .send_command(method, params, self.session_id.clone())
            .await?;
        response.result.ok_or_else(|| Error::cdp("no result in CDP response"))
    }

    async fn subscribe_events(&self, event_type: &str) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>, Error> {
        let mut source = self.connection.listen_events().await?;
        let (tx, rx) = tokio::sync::mpsc::channel(100);
        let filter = event_type.to_string();

        tokio::spawn(async move {
            while let Some(event) = source.recv().await {
                if (event.method == filter || filter == "*") && tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_object_string() {
        let obj = RemoteObject {
            r#type: "string".to_string(),
            subtype: None,
            value: Some(serde_json::json!("hi")),
        };
        assert!(matches!(CdpClientImpl::parse_remote_object(&obj), EvaluationResult::String(s) if s == "hi"));
    }

    #[test]
    fn test_parse_remote_object_number() {
        let obj = RemoteObject {
            r#type: "number".to_string(),
            subtype: None,
            value: Some(serde_json::json!(3.5)),
        };
        assert!(matches!(CdpClientImpl::parse_remote_object(&obj), EvaluationResult::Number(n) if n == 3.5));
    }

    #[test]
    fn test_parse_remote_object_undefined() {
        let obj = RemoteObject {
            r#type: "undefined".to_string(),
            subtype: None,
            value: None,
        };
        assert!(matches!(CdpClientImpl::parse_remote_object(&obj), EvaluationResult::Null));
    }
}
