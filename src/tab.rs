//! Tab Controller: the single entry point external callers drive. Owns one
//! browser context (lazily created through a `ContextFactory`) and a table
//! of tabs layered on top of its pages.
//!
//! Grounded on the teacher's `session::manager::SessionManagerImpl`: a
//! `RwLock`-guarded table, short critical sections that never hold a lock
//! across an `.await`, and an idempotent `cleanup`/`shutdown`. The
//! initialization-in-flight requirement (concurrent callers of a lazy
//! context init must all observe one outcome) is met here with a
//! dedicated `tokio::sync::Mutex` guarding the create-context step,
//! double-checked against the already-initialized case, rather than a
//! `Shared` future — equivalent single-flight semantics with half the
//! moving parts.

use crate::adapter::AdapterIdentity;
use crate::adapter::registry::AdapterRegistry;
use crate::context::{BrowserContext, ContextFactory};
use crate::page::Page;
use crate::util;
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TabInfo {
    pub id: String,
    pub url: String,
    pub title: String,
    pub site_id: Option<String>,
}

struct TabEntry {
    page: Arc<Page>,
    url: String,
    title: String,
    site_id: Option<String>,
}

pub struct TabController {
    factory: Arc<dyn ContextFactory>,
    registry: Arc<AdapterRegistry>,
    context: RwLock<Option<Arc<dyn BrowserContext>>>,
    init_lock: Mutex<()>,
    reconcile_lock: Mutex<()>,
    tabs: RwLock<HashMap<String, TabEntry>>,
    current: RwLock<Option<String>>,
    navigation_timeout: Duration,
}

impl TabController {
    pub fn new(factory: Arc<dyn ContextFactory>, registry: Arc<AdapterRegistry>, navigation_timeout: Duration) -> Self {
        Self {
            factory,
            registry,
            context: RwLock::new(None),
            init_lock: Mutex::new(()),
            reconcile_lock: Mutex::new(()),
            tabs: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            navigation_timeout,
        }
    }

    /// Step 1 of reconciliation: lazily create the context. All concurrent
    /// callers block on `init_lock`; the double-check after acquiring it
    /// means only the first caller actually invokes the factory.
    async fn ensure_context(&self) -> Result<Arc<dyn BrowserContext>, Error> {
        if let Some(ctx) = self.context.read().await.clone() {
            return Ok(ctx);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(ctx) = self.context.read().await.clone() {
            return Ok(ctx);
        }

        let ctx = self.factory.create_context().await?;
        *self.context.write().await = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    async fn clear_context(&self) {
        *self.context.write().await = None;
        self.tabs.write().await.clear();
        *self.current.write().await = None;
    }

    /// Steps 2-6 of the reconciliation algorithm: return the id of a live
    /// tab, adopting or creating one as needed. Held under `reconcile_lock`
    /// for its entire duration (including a retry after a dead-context
    /// signal) so two concurrent callers can never both pass the "no
    /// tracked tab yet" check and adopt the same real page.
    #[instrument(skip(self))]
    async fn ensure_tab(&self, allow_retry: bool) -> Result<String, Error> {
        let _reconcile = self.reconcile_lock.lock().await;
        self.reconcile_locked(allow_retry).await
    }

    async fn reconcile_locked(&self, allow_retry: bool) -> Result<String, Error> {
        let ctx = self.ensure_context().await?;

        // Step 2: probe liveness.
        if ctx.list_pages().await.is_err() {
            warn!("context appears dead during liveness probe");
            self.clear_context().await;
            if allow_retry {
                return Box::pin(self.reconcile_locked(false)).await;
            }
            return Err(Error::browser_unavailable("context unavailable after re-init attempt"));
        }

        // Step 3: remembered current tab still live?
        if let Some(id) = self.current.read().await.clone() {
            let tabs = self.tabs.read().await;
            if let Some(entry) = tabs.get(&id) {
                if !entry.page.is_closed() {
                    return Ok(id);
                }
            }
        }

        // Step 4: prune and scan the tab table.
        {
            let mut tabs = self.tabs.write().await;
            tabs.retain(|_, entry| !entry.page.is_closed());
            if let Some((id, _)) = tabs.iter().next() {
                let id = id.clone();
                drop(tabs);
                *self.current.write().await = Some(id.clone());
                return Ok(id);
            }
        }

        // Step 5: adopt a real page the context already knows about. Single
        // writer throughout (reconcile_lock), so the probe-then-insert pair
        // below is effectively one critical section.
        let existing_pages = ctx.list_pages().await.unwrap_or_default();
        if let Some(page) = existing_pages.into_iter().find(|p| !p.is_closed()) {
            let id = self.adopt_page(page).await;
            *self.current.write().await = Some(id.clone());
            return Ok(id);
        }

        // Step 6: create a fresh page.
        match ctx.new_page("about:blank").await {
            Ok(page) => {
                let id = self.adopt_page(page).await;
                *self.current.write().await = Some(id.clone());
                Ok(id)
            }
            Err(e) if allow_retry && is_context_closed(&e) => {
                self.clear_context().await;
                Box::pin(self.reconcile_locked(false)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn adopt_page(&self, page: Arc<Page>) -> String {
        let id = Uuid::new_v4().to_string();
        let url = page.url().await.unwrap_or_default();
        let title = page.title().await.unwrap_or_default();
        let site_id = self.registry.get_by_url(&url).map(|a| a.website_id().to_string());
        self.tabs.write().await.insert(
            id.clone(),
            TabEntry {
                page,
                url,
                title,
                site_id,
            },
        );
        id
    }

    #[instrument(skip(self))]
    pub async fn open_tab(&self, url: &str) -> Result<String, Error> {
        let id = self.ensure_tab(true).await?;

        let page = {
            let tabs = self.tabs.read().await;
            tabs.get(&id).map(|e| Arc::clone(&e.page))
        }
        .ok_or_else(|| Error::tab_not_found(&id))?;

        page.navigate(url)
            .await
            .map_err(|e| Error::navigation_failed(format!("goto {} failed: {}", url, e)))?;

        let client = page.client();
        util::wait_network_idle(&client, self.navigation_timeout).await;

        let site = self.registry.get_by_url(url);
        if let Some(site) = &site {
            site.is_page_ready(&page).await;
        } else {
            util::wait_dom_ready(&client, Duration::from_secs(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let new_url = page.url().await.unwrap_or_else(|_| url.to_string());
        let new_title = page.title().await.unwrap_or_default();
        let site_id = site.map(|a| a.website_id().to_string());

        let mut tabs = self.tabs.write().await;
        if let Some(entry) = tabs.get_mut(&id) {
            entry.url = new_url;
            entry.title = new_title;
            entry.site_id = site_id;
        }

        info!("opened tab {} at {}", id, url);
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn close_tab(&self, tab_id: &str) -> Result<(), Error> {
        let entry = self.tabs.write().await.remove(tab_id);
        let entry = entry.ok_or_else(|| Error::tab_not_found(tab_id))?;

        if !entry.page.is_closed() {
            entry.page.close().await?;
        }

        let mut current = self.current.write().await;
        if current.as_deref() == Some(tab_id) {
            *current = None;
        }

        Ok(())
    }

    #[instrument(skip(self, text))]
    pub async fn execute_prompt(&self, tab_id: &str, site_id: Option<&str>, text: &str) -> Result<(), Error> {
        if text.is_empty() {
            return Err(Error::adapter_failure("prompt text must not be empty"));
        }

        let (page, resolved_url) = {
            let tabs = self.tabs.read().await;
            let entry = tabs.get(tab_id).ok_or_else(|| Error::tab_not_found(tab_id))?;
            if entry.page.is_closed() {
                return Err(Error::tab_closed(tab_id));
            }
            (Arc::clone(&entry.page), entry.url.clone())
        };

        let adapter = match site_id {
            Some(id) => self
                .registry
                .get_by_id(id)
                .ok_or_else(|| Error::adapter_missing(tab_id))?,
            None => self
                .registry
                .get_by_url(&resolved_url)
                .ok_or_else(|| Error::adapter_missing(tab_id))?,
        };

        adapter
            .execute_prompt(&page, text)
            .await
            .map_err(|e| Error::adapter_failure(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_page_content(&self, tab_id: &str) -> Result<String, Error> {
        let page = {
            let tabs = self.tabs.read().await;
            let entry = tabs.get(tab_id).ok_or_else(|| Error::tab_not_found(tab_id))?;
            if entry.page.is_closed() {
                return Err(Error::tab_closed(tab_id));
            }
            Arc::clone(&entry.page)
        };
        page.content().await
    }

    pub async fn get_tabs(&self) -> Vec<TabInfo> {
        let mut tabs = self.tabs.write().await;
        tabs.retain(|_, entry| !entry.page.is_closed());
        tabs.iter()
            .map(|(id, entry)| TabInfo {
                id: id.clone(),
                url: entry.url.clone(),
                title: entry.title.clone(),
                site_id: entry.site_id.clone(),
            })
            .collect()
    }

    pub fn supported_websites(&self) -> Vec<AdapterIdentity> {
        self.registry.supported_websites()
    }

    /// Periodic cleanup: drop tab entries whose page has closed. Cheap,
    /// idempotent, safe to run on a timer.
    pub async fn prune_closed(&self) {
        let mut tabs = self.tabs.write().await;
        let before = tabs.len();
        tabs.retain(|_, entry| !entry.page.is_closed());
        let pruned = before - tabs.len();
        if pruned > 0 {
            debug!("pruned {} closed tab(s)", pruned);
        }
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), Error> {
        let ids: Vec<String> = self.tabs.read().await.keys().cloned().collect();
        for id in ids {
            let _ = self.close_tab(&id).await;
        }

        if let Some(ctx) = self.context.write().await.take() {
            ctx.close().await?;
        }
        *self.current.write().await = None;

        info!("tab controller shut down");
        Ok(())
    }
}

fn is_context_closed(error: &Error) -> bool {
    matches!(error, Error::BrowserUnavailable(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sites;
    use crate::cdp::traits::{CdpConnection, CdpEvent, CdpResponse};
    use crate::cdp::CdpClientImpl;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct StubConnection {
        active: AtomicBool,
    }

    impl StubConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                active: AtomicBool::new(true),
            })
        }
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
                result: Some(serde_json::json!({"result": {"type": "string", "value": "ok"}})),
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

    fn stub_page(id: &str) -> Arc<Page> {
        let client = Arc::new(CdpClientImpl::new(StubConnection::new()));
        Arc::new(Page::new(id.to_string(), client))
    }

    struct StubContext {
        pages: RwLock<Vec<Arc<Page>>>,
    }

    #[async_trait]
    impl BrowserContext for StubContext {
        async fn new_page(&self, _url: &str) -> Result<Arc<Page>, Error> {
            let page = stub_page("stub-page");
            self.pages.write().await.push(Arc::clone(&page));
            Ok(page)
        }

        async fn list_pages(&self) -> Result<Vec<Arc<Page>>, Error> {
            Ok(self.pages.read().await.clone())
        }

        async fn close(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    impl std::fmt::Debug for StubContext {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("StubContext").finish()
        }
    }

    #[derive(Debug)]
    struct StubFactory;

    #[async_trait]
    impl ContextFactory for StubFactory {
        async fn create_context(&self) -> Result<Arc<dyn BrowserContext>, Error> {
            Ok(Arc::new(StubContext {
                pages: RwLock::new(Vec::new()),
            }))
        }
    }

    fn test_controller() -> TabController {
        let registry = Arc::new(AdapterRegistry::new(sites::builtin()));
        TabController::new(Arc::new(StubFactory), registry, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_open_tab_creates_entry() {
        let controller = test_controller();
        let id = controller.open_tab("https://example.com").await.unwrap();
        let tabs = controller.get_tabs().await;
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].id, id);
    }

    #[tokio::test]
    async fn test_close_tab_removes_entry() {
        let controller = test_controller();
        let id = controller.open_tab("https://example.com").await.unwrap();
        controller.close_tab(&id).await.unwrap();
        assert!(controller.get_tabs().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_unknown_tab_errors() {
        let controller = test_controller();
        let result = controller.close_tab("nonexistent").await;
        assert!(matches!(result.unwrap_err(), Error::TabNotFound(_)));
    }

    #[tokio::test]
    async fn test_supported_websites_nonempty() {
        let controller = test_controller();
        assert_eq!(controller.supported_websites().len(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let controller = test_controller();
        controller.open_tab("https://example.com").await.unwrap();
        controller.shutdown().await.unwrap();
        controller.shutdown().await.unwrap();
        assert!(controller.get_tabs().await.is_empty());
    }
}
