//! Browser context abstraction: an opaque producer of pages, with two
//! concrete variants (persistent local browser, relay-backed extension
//! bridge) the tab controller treats uniformly.

pub mod persistent;
pub mod relay_backed;

use crate::page::Page;
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// A live browser context: something that can produce and enumerate pages.
/// Mutated only by the tab controller.
#[async_trait]
pub trait BrowserContext: Send + Sync + std::fmt::Debug {
    async fn new_page(&self, url: &str) -> Result<Arc<Page>, Error>;
    async fn list_pages(&self) -> Result<Vec<Arc<Page>>, Error>;
    async fn close(&self) -> Result<(), Error>;
}

/// Capability-only factory: the controller never inspects which variant it
/// holds. `create_context` performs whatever startup work the variant
/// needs (launching a browser process, binding a relay listener) and
/// returns a ready-to-use handle.
#[async_trait]
pub trait ContextFactory: Send + Sync + std::fmt::Debug {
    async fn create_context(&self) -> Result<Arc<dyn BrowserContext>, Error>;
}
