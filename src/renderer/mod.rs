//! Renderer abstraction for browser-driven page fetches.
//!
//! Several bank portals build their rate widgets client-side; a plain GET
//! returns a shell with no numbers. The `Renderer` and `RenderContext`
//! traits abstract over the browser engine (currently Chromium via
//! chromiumoxide) so rendered-fetch adapters never touch CDP directly.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;

/// Result of navigating to a URL.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser context (tab). Each rendered fetch opens its own and
/// closes it when done, so concurrent adapters never share page state.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML after rendering.
    async fn get_html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Direct and derived adapters work without a browser; this stub makes
/// rendered fetches fail with a clear error instead of taking the whole
/// run down.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available — direct fetches only"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
