//! Chrome DevTools Protocol client
//!
//! WebSocket transport, typed request/response envelopes, and the
//! high-level client and browser-control abstractions built on top. Used
//! both by the persistent context (talking to a locally-launched Chrome)
//! and the relay-backed context (talking back through the bridge's own
//! `/cdp` endpoint).
//!
//! - `traits`: connection/client/browser interfaces
//! - `types`: wire-level request/response/notification shapes
//! - `connection`: WebSocket transport with command correlation
//! - `client`: typed operations (navigate, evaluate, ...)
//! - `browser`: HTTP discovery (`/json`, `/json/new`, `/json/version`)

pub mod browser;
pub mod client;
pub mod connection;
pub mod traits;
pub mod types;

pub use browser::CdpBrowserImpl;
pub use client::CdpClientImpl;
pub use connection::CdpWebSocketConnection;
pub use traits::{
    CdpBrowser, CdpClient, CdpConnection, CdpError, CdpEvent, CdpResponse, EvaluationResult,
    NavigationResult, TargetInfo,
};
