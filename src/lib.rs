//! CDP Bridge: a relay and tab controller for driving chat web UIs from an
//! already-running browser, or from a locally-launched one.
//!
//! The relay (`relay`) bridges a CDP client to a browser extension over two
//! WebSocket endpoints. The tab controller (`tab`) sits above a
//! `ContextFactory` (`context`) and a registry of per-site adapters
//! (`adapter`), exposing `openTab`/`closeTab`/`executePrompt`/... as the
//! single point external callers drive.

pub mod error;
pub mod config;

pub mod adapter;
pub mod cdp;
pub mod context;
pub mod page;
pub mod relay;
pub mod selectors;
pub mod tab;
pub mod util;

pub use error::{Error, Result};

/// CDP Bridge library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
