//! Persistent context: launches a local Chrome against a per-OS cache
//! directory and drives it through the HTTP discovery + WebSocket client
//! stack.
//!
//! Process launch, port discovery, and readiness polling are grounded in
//! `chrome-cli`'s launcher; the client stack itself is the teacher's
//! `CdpBrowserImpl`/`CdpWebSocketConnection`.

use super::BrowserContext;
use crate::cdp::{CdpBrowser, CdpBrowserImpl};
use crate::page::Page;
use crate::Error;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(15);
const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn find_available_port() -> Result<u16, Error> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| Error::browser_unavailable(format!("could not bind to find a free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::browser_unavailable(format!("could not read local address: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

fn default_chrome_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cdp-bridge")
        .join("chrome-profile")
}

fn candidate_executables() -> &'static [&'static str] {
    &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ]
}

fn resolve_chrome_path(configured: Option<&str>) -> Result<String, Error> {
    if let Some(path) = configured {
        return Ok(path.to_string());
    }
    for candidate in candidate_executables() {
        if Command::new(candidate).arg("--version").output().is_ok() {
            return Ok(candidate.to_string());
        }
    }
    Err(Error::browser_unavailable(
        "no Chrome/Chromium executable found; set CDP_BRIDGE_CHROME_PATH",
    ))
}

fn is_profile_locked(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("profile") && (lower.contains("lock") || lower.contains("in use"))
}

/// A handle to a spawned Chrome process. Killed on drop unless detached.
struct ChromeProcess {
    child: Option<std::process::Child>,
}

impl Drop for ChromeProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

async fn spawn_chrome(executable: &str, port: u16, data_dir: &PathBuf, headless: bool) -> Result<ChromeProcess, Error> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::browser_unavailable(format!("could not create chrome data dir: {}", e)))?;

    let mut cmd = Command::new(executable);
    cmd.arg(format!("--remote-debugging-port={}", port))
        .arg(format!("--user-data-dir={}", data_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check");
    if headless {
        cmd.arg("--headless=new");
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    let child = cmd
        .spawn()
        .map_err(|e| Error::browser_unavailable(format!("failed to spawn {}: {}", executable, e)))?;

    let mut process = ChromeProcess { child: Some(child) };
    let browser = CdpBrowserImpl::new(format!("ws://127.0.0.1:{}", port));

    let start = tokio::time::Instant::now();
    loop {
        if start.elapsed() > LAUNCH_TIMEOUT {
            return Err(Error::browser_unavailable(format!(
                "chrome did not become ready on port {} within {:?}",
                port, LAUNCH_TIMEOUT
            )));
        }
        if let Some(child) = process.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(Error::browser_unavailable(format!(
                    "chrome exited with status {} before becoming ready",
                    status
                )));
            }
        }
        if browser.query_version().await.is_ok() {
            return Ok(process);
        }
        tokio::time::sleep(LAUNCH_POLL_INTERVAL).await;
    }
}

/// Persistent context: a single locally-launched Chrome process, its
/// profile directory, and the pages created against it.
#[derive(Debug)]
pub struct PersistentContext {
    browser: Arc<CdpBrowserImpl>,
    pages: RwLock<Vec<Arc<Page>>>,
    _process: ChromeProcess,
}

impl std::fmt::Debug for ChromeProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeProcess").finish()
    }
}

#[async_trait]
impl BrowserContext for PersistentContext {
    async fn new_page(&self, url: &str) -> Result<Arc<Page>, Error> {
        let ws_url = self.browser.create_target(url).await?;
        let client = self.browser.create_client(&ws_url).await?;
        let page_id = ws_url.rsplit('/').next().unwrap_or(&ws_url).to_string();
        let page = Arc::new(Page::new(page_id, client));
        self.pages.write().await.push(Arc::clone(&page));
        Ok(page)
    }

    async fn list_pages(&self) -> Result<Vec<Arc<Page>>, Error> {
        let mut pages = self.pages.write().await;
        pages.retain(|p| !p.is_closed());
        Ok(pages.clone())
    }

    async fn close(&self) -> Result<(), Error> {
        self.browser.close().await
    }
}

/// Builds `PersistentContext`s: launches a local Chrome, retrying on
/// profile-locked failures, per spec §4.5.
#[derive(Debug, Clone)]
pub struct PersistentContextFactory {
    chrome_path: Option<String>,
    data_dir: Option<PathBuf>,
    headless: bool,
    retries: u32,
}

impl PersistentContextFactory {
    pub fn new(chrome_path: Option<String>, data_dir: Option<PathBuf>, headless: bool, retries: u32) -> Self {
        Self {
            chrome_path,
            data_dir,
            headless,
            retries,
        }
    }
}

#[async_trait]
impl super::ContextFactory for PersistentContextFactory {
    async fn create_context(&self) -> Result<Arc<dyn BrowserContext>, Error> {
        let executable = resolve_chrome_path(self.chrome_path.as_deref())?;
        let data_dir = self.data_dir.clone().unwrap_or_else(default_chrome_data_dir);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let port = find_available_port()?;
            match spawn_chrome(&executable, port, &data_dir, self.headless).await {
                Ok(process) => {
                    info!("launched chrome on port {} (attempt {})", port, attempt);
                    let browser = Arc::new(CdpBrowserImpl::new(format!("ws://127.0.0.1:{}", port)));
                    return Ok(Arc::new(PersistentContext {
                        browser,
                        pages: RwLock::new(Vec::new()),
                        _process: process,
                    }));
                }
                Err(e) if is_profile_locked(&e.to_string()) && attempt < self.retries => {
                    warn!("chrome profile locked, retrying ({}/{})", attempt, self.retries);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    debug!("chrome launch failed on attempt {}: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_profile_locked_detects_lock_messages() {
        assert!(is_profile_locked("ProcessSingleton: profile appears to be in use"));
        assert!(is_profile_locked("could not lock profile directory"));
        assert!(!is_profile_locked("permission denied"));
    }

    #[test]
    fn test_find_available_port_returns_nonzero() {
        let port = find_available_port().unwrap();
        assert_ne!(port, 0);
    }
}
