//! Derived adapter: annualizes a configured monthly yield.

use super::{AdapterOutcome, FailureReason, RateQuote, SourceAdapter};
use crate::config::EntityConfig;
use async_trait::async_trait;

/// Adapter for the real-estate yield estimate.
///
/// There is no page with a quotable number; the comparable figure is an
/// annualization of the gross monthly rental yield (`monthly × 12`). The
/// monthly input comes from configuration (sourced from Fedelonjas market
/// studies); when it is absent or nonsensical the entity fails validation
/// for the run instead of emitting a fabricated rate.
pub struct DerivedAdapter {
    entity: EntityConfig,
}

impl DerivedAdapter {
    pub fn new(entity: EntityConfig) -> Self {
        Self { entity }
    }
}

#[async_trait]
impl SourceAdapter for DerivedAdapter {
    fn entity(&self) -> &EntityConfig {
        &self.entity
    }

    async fn fetch(&self) -> AdapterOutcome {
        let monthly = match self.entity.monthly_yield_pct {
            Some(m) if m.is_finite() && m > 0.0 => m,
            Some(m) => {
                return AdapterOutcome::failure(
                    FailureReason::Validation,
                    format!("monthly yield input is not a usable figure: {m}"),
                )
            }
            None => {
                return AdapterOutcome::failure(
                    FailureReason::Validation,
                    "monthly yield input unavailable",
                )
            }
        };

        let annual = monthly * 12.0;
        let terms: Vec<u32> = if self.entity.term_days.is_empty() {
            vec![0]
        } else {
            self.entity.term_days.clone()
        };

        AdapterOutcome::Success {
            quotes: terms
                .into_iter()
                .map(|term_days| RateQuote {
                    term_days,
                    annual_rate_pct: annual,
                })
                .collect(),
            warnings: Vec::new(),
        }
    }
}
