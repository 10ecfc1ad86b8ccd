//! Site adapters: per-site policy for driving a chat web UI.
//!
//! Adapters are value objects (teacher's `Adapter identity` pattern, §3,
//! §9 design note: "adapters carry no state"); the shared execution
//! algorithm lives once on `SiteAdapter` rather than being re-implemented
//! per site. Only `wait_for_response` is a per-site override point.

pub mod human;
pub mod registry;
pub mod sites;

use crate::page::Page;
use crate::selectors::SelectorProfile;
use crate::Error;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Immutable adapter identity, mirrored directly from spec §3.
#[derive(Debug, Clone)]
pub struct AdapterIdentity {
    pub website_id: String,
    pub display_name: String,
    pub home_url: String,
    pub requires_proxy: bool,
}

/// Per-site override of the "has the assistant finished responding" check.
/// The default waiter just sleeps; site-specific waiters poll for an
/// assistant-authored element and the absence of a typing indicator.
#[async_trait]
pub trait ResponseWaiter: Send + Sync + fmt::Debug {
    async fn wait(&self, page: &Page);
}

/// Default: sleep a fixed 2s, per spec §4.3 step 8.
#[derive(Debug, Default)]
pub struct FixedDelayWaiter;

#[async_trait]
impl ResponseWaiter for FixedDelayWaiter {
    async fn wait(&self, _page: &Page) {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

/// A site adapter: identity, selector profile, URL matcher, and the shared
/// execution algorithm.
#[derive(Debug, Clone)]
pub struct SiteAdapter {
    pub identity: AdapterIdentity,
    pub selectors: SelectorProfile,
    /// Hostname substrings this adapter claims; first match wins in the
    /// registry's `get_by_url`.
    pub url_hosts: Vec<String>,
    pub response_waiter: Arc<dyn ResponseWaiter>,
}

impl SiteAdapter {
    pub fn website_id(&self) -> &str {
        &self.identity.website_id
    }

    pub fn url_matcher(&self, url: &str) -> bool {
        self.url_hosts.iter().any(|host| url.contains(host.as_str()))
    }

    /// DOM-ready probe with a short ignored timeout; never fails.
    pub async fn is_page_ready(&self, page: &Page) -> bool {
        let client = page.client();
        crate::util::wait_dom_ready(&client, Duration::from_secs(10)).await;
        true
    }

    /// Steps 1-8 of the adapter execution algorithm (spec §4.3).
    pub async fn execute_prompt(&self, page: &Page, text: &str) -> Result<(), Error> {
        let client = page.client();

        // 1. Wait until DOM is ready (best-effort).
        crate::util::wait_dom_ready(&client, Duration::from_secs(10)).await;

        // 2. Think delay.
        human::think_delay().await;

        // 3. Locate input.
        let input_selector = human::locate_visible_enabled(&client, &self.selectors.input_area)
            .await
            .map_err(|_| Error::input_not_found(format!("no input selector matched for {}", self.website_id())))?;

        // 4. Hover, short delay, click, focus fallback, clear.
        human::hover(&client, &input_selector).await?;
        human::short_delay().await;
        human::click(&client, &input_selector).await?;
        human::focus(&client, &input_selector).await?;
        human::clear(&client, &input_selector).await?;

        // 5. Human typing.
        human::type_human(&client, &input_selector, text).await?;

        // 6. Pre-send delay.
        human::pre_send_delay().await;

        // 7. Locate send, or press Enter.
        match human::locate_visible_enabled(&client, &self.selectors.send_button).await {
            Ok(send_selector) => {
                human::hover(&client, &send_selector).await?;
                human::short_delay().await;
                human::click(&client, &send_selector).await?;
            }
            Err(_) => {
                let press_enter = format!(
                    "(() => {{ const el = document.querySelector('{}'); if (!el) return null; \
                     el.dispatchEvent(new KeyboardEvent('keydown', {{key: 'Enter', bubbles: true}})); \
                     el.dispatchEvent(new KeyboardEvent('keyup', {{key: 'Enter', bubbles: true}})); return 'sent'; }})()",
                    human::escape_js(&input_selector)
                );
                client.evaluate(&press_enter, false).await?;
            }
        }

        // 8. Wait for completion (best-effort, adapter-specific).
        self.response_waiter.wait(page).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::SelectorProfile;

    #[test]
    fn test_url_matcher_matches_substring() {
        let adapter = SiteAdapter {
            identity: AdapterIdentity {
                website_id: "deepseek".to_string(),
                display_name: "DeepSeek".to_string(),
                home_url: "https://chat.deepseek.com".to_string(),
                requires_proxy: false,
            },
            selectors: SelectorProfile::default(),
            url_hosts: vec!["deepseek.com".to_string()],
            response_waiter: Arc::new(FixedDelayWaiter),
        };

        assert!(adapter.url_matcher("https://chat.deepseek.com/x"));
        assert!(!adapter.url_matcher("https://chat.openai.com"));
    }
}
