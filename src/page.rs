//! Page handle
//!
//! Thin wrapper around a `CdpClient` plus the bits the tab controller and
//! adapters need to track about one browser page: its id, last-observed
//! URL/title, and whether the underlying page has been detected closed.

use crate::cdp::CdpClient;
use crate::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A live handle to one browser page.
#[derive(Debug)]
pub struct Page {
    id: String,
    client: Arc<dyn CdpClient>,
    closed: AtomicBool,
}

impl Page {
    pub fn new(id: String, client: Arc<dyn CdpClient>) -> Self {
        Self {
            id,
            client,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> Arc<dyn CdpClient> {
        Arc::clone(&self.client)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.client.connection().is_active()
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn url(&self) -> Result<String, Error> {
        match self.client.evaluate("window.location.href", false).await? {
            crate::cdp::EvaluationResult::String(s) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    pub async fn title(&self) -> Result<String, Error> {
        match self.client.evaluate("document.title", false).await? {
            crate::cdp::EvaluationResult::String(s) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<(), Error> {
        self.client.navigate(url).await?;
        Ok(())
    }

    pub async fn content(&self) -> Result<String, Error> {
        self.client.get_content().await
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.mark_closed();
        self.client.connection().close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::traits::{CdpConnection, CdpEvent, CdpResponse};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StubConnection {
        active: AtomicBool,
    }

    #[async_trait]
    impl CdpConnection for StubConnection {
        async fn send_command(
            &self,
            _method: &str,
            _params: serde_json::Value,
            _session_id: Option<String>,
        ) -> Result<CdpResponse, Error> {
            Ok(CdpResponse {
                id: 1,
                result: Some(serde_json::json!({})),
                error: None,
            })
        }

        async fn listen_events(&self) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>, Error> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }

        async fn close(&self) -> Result<(), Error> {
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_page_closed_tracks_connection() {
        let conn: Arc<dyn CdpConnection> = Arc::new(StubConnection {
            active: AtomicBool::new(true),
        });
        let client = Arc::new(crate::cdp::CdpClientImpl::new(conn));
        let page = Page::new("p1".to_string(), client);
        assert!(!page.is_closed());

        page.close().await.unwrap();
        assert!(page.is_closed());
    }
}
