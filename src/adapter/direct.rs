//! Direct-fetch adapter: plain document GET plus markup extraction.

use super::{classify_extraction, AdapterOutcome, FailureReason, RateQuote, SourceAdapter};
use crate::config::EntityConfig;
use crate::extract;
use crate::http_client::{error_is_timeout, HttpClient};
use async_trait::async_trait;

/// Adapter for sources whose markup is complete without JavaScript.
///
/// Term-structured products (CDT ladders) go through the table extractor;
/// flat products (savings, fiduciary) through the single-figure scan.
pub struct DirectFetchAdapter {
    entity: EntityConfig,
    client: HttpClient,
}

impl DirectFetchAdapter {
    pub fn new(entity: EntityConfig) -> Self {
        let client = HttpClient::new(entity.timeout());
        Self { entity, client }
    }

    async fn fetch_inner(&self) -> AdapterOutcome {
        let resp = match self.client.get(&self.entity.source_url).await {
            Ok(r) => r,
            Err(e) => {
                let reason = if error_is_timeout(&e) {
                    FailureReason::Timeout
                } else {
                    FailureReason::Network
                };
                return AdapterOutcome::failure(reason, format!("{e:#}"));
            }
        };

        if !resp.is_success() {
            return AdapterOutcome::failure(
                FailureReason::Network,
                format!("HTTP {} from {}", resp.status, resp.final_url),
            );
        }

        if self.entity.term_days.is_empty() {
            match extract::extract_flat_rate(&resp.body) {
                Some(rate) => AdapterOutcome::Success {
                    quotes: vec![RateQuote {
                        term_days: 0,
                        annual_rate_pct: rate,
                    }],
                    warnings: Vec::new(),
                },
                None => AdapterOutcome::failure(
                    FailureReason::Parse,
                    format!("no flat rate figure found at {}", resp.final_url),
                ),
            }
        } else {
            classify_extraction(&self.entity, extract::extract_term_rates(&resp.body))
        }
    }
}

#[async_trait]
impl SourceAdapter for DirectFetchAdapter {
    fn entity(&self) -> &EntityConfig {
        &self.entity
    }

    async fn fetch(&self) -> AdapterOutcome {
        // The HTTP client carries the same timeout per request; this outer
        // guard also covers retry sleeps and body reads.
        match tokio::time::timeout(self.entity.timeout(), self.fetch_inner()).await {
            Ok(outcome) => outcome,
            Err(_) => AdapterOutcome::failure(
                FailureReason::Timeout,
                format!("fetch exceeded {}ms", self.entity.timeout_ms),
            ),
        }
    }
}
