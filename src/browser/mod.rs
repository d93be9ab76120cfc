//! Browser gateway abstraction.
//!
//! The dispatch subsystem talks to remote browsers through these traits;
//! the production implementation rides the Chrome DevTools Protocol via
//! chromiumoxide (`cdp`), and tests substitute a scriptable in-memory
//! stack (`mock`).

pub mod cdp;
#[cfg(test)]
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

// Re-export common types
pub use cdp::CdpGateway;

/// Outcome of a page navigation: the main-frame HTTP response, if the
/// browser produced one.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationResponse {
    /// HTTP status code; 0 when no main-frame response was observed
    pub status: u16,
    /// Status text as supplied by the transport, when any
    pub status_text: Option<String>,
}

/// Screenshot encodings supported by the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// Connects to remote browser instances by endpoint.
#[async_trait]
pub trait BrowserGateway: Send + Sync {
    /// Open a session against one browser endpoint. `slow_mo_ms` inserts a
    /// fixed delay before every page command (debugging aid, 0 disables).
    async fn connect(&self, endpoint: &str, slow_mo_ms: u64) -> Result<Box<dyn BrowserSession>>;
}

/// One live connection to a remote browser. Owned exclusively by a worker
/// for the worker's entire lifetime.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open a fresh page (tab). Pages are scoped to a single capture
    /// attempt and must be closed on every exit path.
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>>;

    /// Close the session. Best effort; the connection may already be gone.
    async fn close(&mut self) -> Result<()>;
}

/// One page within a session.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Navigate and wait for the DOM to be ready, returning the main-frame
    /// HTTP response. Callers bound this with their own wall-clock timeout.
    async fn navigate(&self, url: &str) -> Result<NavigationResponse>;

    /// Evaluate a JavaScript expression in the page, awaiting it if it
    /// yields a promise. The result value is discarded.
    async fn evaluate(&self, expression: &str) -> Result<()>;

    /// Render the page to an encoded image.
    async fn screenshot(
        &self,
        format: ImageFormat,
        quality: Option<u32>,
        full_page: bool,
    ) -> Result<Vec<u8>>;

    /// Serialize the current DOM to an HTML string.
    async fn content(&self) -> Result<String>;

    /// Close the page. Best effort.
    async fn close(self: Box<Self>) -> Result<()>;
}
