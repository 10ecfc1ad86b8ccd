//! Relay-backed context: owns a `RelayServer` bound to an OS-assigned
//! port and drives it through a CDP client connected back to its own
//! `/cdp` endpoint.
//!
//! Resolves the cyclic dependency noted in spec §9 (the relay needs to
//! exist before anything can connect to it, but the client wants the
//! relay's address) via bind-then-yield port discovery: `RelayServer::bind`
//! returns once the listener is up, and only then does this factory dial
//! back in.
//!
//! A relay-backed context exposes at most one live page at a time — the
//! relay's state machine tracks a single `TargetAttachment`, so
//! `new_page`/`list_pages` degenerate to 0-or-1 entries rather than
//! modeling a real multi-tab browser.

use super::BrowserContext;
use crate::cdp::{CdpClientImpl, CdpWebSocketConnection};
use crate::cdp::traits::CdpClient;
use crate::page::Page;
use crate::relay::RelayServer;
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug)]
pub struct RelayContext {
    cdp_endpoint: String,
    server: Mutex<Option<RelayServer>>,
    page: RwLock<Option<Arc<Page>>>,
}

#[async_trait]
impl BrowserContext for RelayContext {
    async fn new_page(&self, url: &str) -> Result<Arc<Page>, Error> {
        {
            let existing = self.page.read().await;
            if let Some(page) = existing.as_ref() {
                if !page.is_closed() {
                    page.navigate(url).await?;
                    return Ok(Arc::clone(page));
                }
            }
        }

        let connection = CdpWebSocketConnection::new(self.cdp_endpoint.clone()).await?;
        let client = Arc::new(CdpClientImpl::new(connection));
        client.navigate(url).await?;

        let page = Arc::new(Page::new("relay-tab".to_string(), client));
        *self.page.write().await = Some(Arc::clone(&page));
        Ok(page)
    }

    async fn list_pages(&self) -> Result<Vec<Arc<Page>>, Error> {
        let page = self.page.read().await;
        match page.as_ref() {
            Some(p) if !p.is_closed() => Ok(vec![Arc::clone(p)]),
            _ => Ok(Vec::new()),
        }
    }

    async fn close(&self) -> Result<(), Error> {
        if let Some(page) = self.page.write().await.take() {
            let _ = page.close().await;
        }
        if let Some(server) = self.server.lock().await.take() {
            server.shutdown().await?;
        }
        Ok(())
    }
}

/// Builds `RelayContext`s: one relay listener per context, per spec §4.5.
#[derive(Debug, Clone, Default)]
pub struct RelayContextFactory {
    host: String,
}

impl RelayContextFactory {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl super::ContextFactory for RelayContextFactory {
    async fn create_context(&self) -> Result<Arc<dyn BrowserContext>, Error> {
        let host = if self.host.is_empty() { "127.0.0.1" } else { &self.host };
        let server = RelayServer::bind(host, 0).await?;
        let cdp_endpoint = server.cdp_endpoint();
        Ok(Arc::new(RelayContext {
            cdp_endpoint,
            server: Mutex::new(Some(server)),
            page: RwLock::new(None),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextFactory;

    #[tokio::test]
    async fn test_relay_context_starts_with_no_pages() {
        let factory = RelayContextFactory::new("127.0.0.1");
        let context = factory.create_context().await.unwrap();
        assert!(context.list_pages().await.unwrap().is_empty());
    }
}
