//! Rendered-fetch adapter: browser-driven fetch for JS-built pages.

use super::{classify_extraction, AdapterOutcome, FailureReason, RateQuote, SourceAdapter};
use crate::config::EntityConfig;
use crate::extract;
use crate::renderer::{RenderContext, Renderer};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// How often to poll the page's readyState after navigation.
const SETTLE_POLL: Duration = Duration::from_millis(300);
const SETTLE_POLLS_MAX: u32 = 10;

/// Adapter for sources that assemble their rate widgets client-side.
///
/// Shares one browser engine with the other rendered adapters but opens its
/// own tab per fetch, so concurrent fetches never share page state. The tab
/// is closed on every path, including failures.
pub struct RenderedFetchAdapter {
    entity: EntityConfig,
    renderer: Arc<dyn Renderer>,
}

impl RenderedFetchAdapter {
    pub fn new(entity: EntityConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self { entity, renderer }
    }

    async fn fetch_inner(&self) -> AdapterOutcome {
        let mut ctx = match self.renderer.new_context().await {
            Ok(c) => c,
            Err(e) => return AdapterOutcome::failure(FailureReason::Network, format!("{e:#}")),
        };

        let html = self.render_page(&mut ctx).await;
        let _ = ctx.close().await;

        let html = match html {
            Ok(h) => h,
            Err(e) => {
                let msg = format!("{e:#}");
                let reason = if msg.contains("timed out") {
                    FailureReason::Timeout
                } else {
                    FailureReason::Network
                };
                return AdapterOutcome::failure(reason, msg);
            }
        };

        if self.entity.term_days.is_empty() {
            match extract::extract_flat_rate(&html) {
                Some(rate) => AdapterOutcome::Success {
                    quotes: vec![RateQuote {
                        term_days: 0,
                        annual_rate_pct: rate,
                    }],
                    warnings: Vec::new(),
                },
                None => AdapterOutcome::failure(
                    FailureReason::Parse,
                    format!("no flat rate figure found at {}", self.entity.source_url),
                ),
            }
        } else {
            classify_extraction(&self.entity, extract::extract_term_rates(&html))
        }
    }

    /// Navigate, wait for the page to settle, and pull the rendered HTML.
    async fn render_page(&self, ctx: &mut Box<dyn RenderContext>) -> anyhow::Result<String> {
        ctx.navigate(&self.entity.source_url, self.entity.timeout_ms)
            .await?;

        // wait_for_navigation fires on the document load event; the rate
        // widget may still be filling in. Poll readyState, then give the
        // scripts one more beat.
        for _ in 0..SETTLE_POLLS_MAX {
            match ctx.execute_js("document.readyState").await {
                Ok(state) if state.as_str() == Some("complete") => break,
                _ => tokio::time::sleep(SETTLE_POLL).await,
            }
        }
        tokio::time::sleep(SETTLE_POLL).await;

        ctx.get_html().await
    }
}

#[async_trait]
impl SourceAdapter for RenderedFetchAdapter {
    fn entity(&self) -> &EntityConfig {
        &self.entity
    }

    async fn fetch(&self) -> AdapterOutcome {
        match tokio::time::timeout(self.entity.timeout(), self.fetch_inner()).await {
            Ok(outcome) => outcome,
            Err(_) => AdapterOutcome::failure(
                FailureReason::Timeout,
                format!("rendered fetch exceeded {}ms", self.entity.timeout_ms),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProductType;
    use crate::renderer::NoopRenderer;

    fn entity() -> EntityConfig {
        EntityConfig {
            entity_id: "bancolombia".to_string(),
            display_name: "Bancolombia".to_string(),
            product_type: ProductType::Cdt,
            fetch_strategy: crate::config::FetchStrategy::Rendered,
            source_url: "https://www.bancolombia.com/cdt".to_string(),
            term_days: vec![30, 60, 90],
            timeout_ms: 2_000,
            monthly_yield_pct: None,
        }
    }

    #[tokio::test]
    async fn test_rendered_fetch_without_browser_fails_as_network() {
        let adapter = RenderedFetchAdapter::new(entity(), Arc::new(NoopRenderer));
        match adapter.fetch().await {
            AdapterOutcome::Failure { reason, detail } => {
                assert_eq!(reason, FailureReason::Network);
                assert!(detail.contains("browser not available"));
            }
            other => panic!("expected failure, got {}", other.kind()),
        }
    }
}
