//! Unified error types for CDP Bridge

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for CDP Bridge
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP protocol errors (malformed frame, unexpected envelope shape)
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Context could not be created after retries; fatal to the calling operation
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// Tab id not present in the controller's table
    #[error("Tab not found: {0}")]
    TabNotFound(String),

    /// Tab's underlying page is closed
    #[error("Tab closed: {0}")]
    TabClosed(String),

    /// Neither an explicit site id nor the tab's URL yields an adapter
    #[error("No adapter available for tab {0}")]
    AdapterMissing(String),

    /// An adapter-level failure, wrapped with the adapter's message
    #[error("Adapter failure: {0}")]
    AdapterFailure(String),

    /// Input field could not be located via any selector in the profile
    #[error("Input not found: {0}")]
    InputNotFound(String),

    /// `goto` navigation failed outright (not a best-effort wait timing out)
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// A fatal (non-recovered) timeout, as opposed to a best-effort wait
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Malformed frame or unexpected envelope on a relay socket
    #[error("Relay protocol error: {0}")]
    RelayProtocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new browser-unavailable error
    pub fn browser_unavailable<S: Into<String>>(msg: S) -> Self {
        Error::BrowserUnavailable(msg.into())
    }

    /// Create a new tab-not-found error
    pub fn tab_not_found<S: Into<String>>(id: S) -> Self {
        Error::TabNotFound(id.into())
    }

    /// Create a new tab-closed error
    pub fn tab_closed<S: Into<String>>(id: S) -> Self {
        Error::TabClosed(id.into())
    }

    /// Create a new adapter-missing error
    pub fn adapter_missing<S: Into<String>>(id: S) -> Self {
        Error::AdapterMissing(id.into())
    }

    /// Create a new adapter-failure error
    pub fn adapter_failure<S: Into<String>>(msg: S) -> Self {
        Error::AdapterFailure(msg.into())
    }

    /// Create a new input-not-found error
    pub fn input_not_found<S: Into<String>>(msg: S) -> Self {
        Error::InputNotFound(msg.into())
    }

    /// Create a new navigation-failed error
    pub fn navigation_failed<S: Into<String>>(msg: S) -> Self {
        Error::NavigationFailed(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new relay-protocol error
    pub fn relay_protocol<S: Into<String>>(msg: S) -> Self {
        Error::RelayProtocol(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}
