//! Source adapter contract.
//!
//! One adapter per registered entity. Adapters differ in how they obtain a
//! page (direct GET, browser-rendered fetch, or a pure derivation) but all
//! converge on the same outcome type, so the orchestrator never branches on
//! the variant. Errors never escape `fetch`: anything that goes wrong inside
//! an adapter becomes a [`AdapterOutcome::Failure`] at this boundary.

pub mod derived;
pub mod direct;
pub mod rendered;

use crate::config::EntityConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A candidate rate extracted by an adapter.
///
/// Identity (entity, product, URL) and observation metadata are attached by
/// the orchestrator at merge time; the adapter only reports what it read.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    /// Term in days; 0 for flat products.
    pub term_days: u32,
    /// Effective annual rate, percent.
    pub annual_rate_pct: f64,
}

/// Why an adapter produced no usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Connection, DNS, or HTTP-status failure.
    Network,
    /// The adapter (or the whole run) exceeded its budget.
    Timeout,
    /// Fetched content did not match the expected structure.
    Parse,
    /// Extracted values failed sanity checks, or derivation inputs were
    /// unavailable.
    Validation,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::Parse => "PARSE",
            Self::Validation => "VALIDATION",
        };
        f.write_str(s)
    }
}

/// What one adapter run produced.
#[derive(Debug, Clone)]
pub enum AdapterOutcome {
    /// Every expected term was extracted.
    Success {
        quotes: Vec<RateQuote>,
        warnings: Vec<String>,
    },
    /// Some expected terms are missing; the rest are usable.
    Partial {
        quotes: Vec<RateQuote>,
        missing_terms: BTreeSet<u32>,
    },
    /// Nothing usable; the entity is down for this run.
    Failure {
        reason: FailureReason,
        detail: String,
    },
}

impl AdapterOutcome {
    pub fn failure(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self::Failure {
            reason,
            detail: detail.into(),
        }
    }

    /// Outcome kind label for reports and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Partial { .. } => "partial",
            Self::Failure { .. } => "failure",
        }
    }
}

/// The uniform contract every source implements.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Static configuration this adapter was built from.
    fn entity(&self) -> &EntityConfig;

    /// Fetch and normalize this source's quotes.
    ///
    /// Must return within the entity's own timeout; the orchestrator grants
    /// a short grace on top before writing the adapter off as timed out.
    async fn fetch(&self) -> AdapterOutcome;
}

/// Classify extracted `(term, rate)` pairs against the configured term list.
///
/// Empty extraction is a parse failure; a subset of the expected terms is a
/// partial success naming the missing ones. Terms outside the configured
/// list are kept — the orchestrator surfaces the mismatch as a warning
/// instead of dropping data.
pub fn classify_extraction(entity: &EntityConfig, pairs: Vec<(u32, f64)>) -> AdapterOutcome {
    if pairs.is_empty() {
        return AdapterOutcome::failure(
            FailureReason::Parse,
            format!("no rate figures found at {}", entity.source_url),
        );
    }

    let quotes: Vec<RateQuote> = pairs
        .into_iter()
        .map(|(term_days, annual_rate_pct)| RateQuote {
            term_days,
            annual_rate_pct,
        })
        .collect();

    let found: BTreeSet<u32> = quotes.iter().map(|q| q.term_days).collect();
    let missing: BTreeSet<u32> = entity
        .term_days
        .iter()
        .copied()
        .filter(|t| !found.contains(t))
        .collect();

    if missing.is_empty() {
        AdapterOutcome::Success {
            quotes,
            warnings: Vec::new(),
        }
    } else {
        AdapterOutcome::Partial {
            quotes,
            missing_terms: missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_entities;

    fn cdt_entity() -> EntityConfig {
        default_entities()
            .into_iter()
            .find(|e| e.entity_id == "bancolombia")
            .unwrap()
    }

    #[test]
    fn test_classify_all_terms_present() {
        let outcome = classify_extraction(&cdt_entity(), vec![(30, 9.5), (60, 9.75), (90, 10.0)]);
        match outcome {
            AdapterOutcome::Success { quotes, warnings } => {
                assert_eq!(quotes.len(), 3);
                assert!(warnings.is_empty());
            }
            other => panic!("expected success, got {}", other.kind()),
        }
    }

    #[test]
    fn test_classify_missing_terms() {
        let outcome = classify_extraction(&cdt_entity(), vec![(30, 9.5)]);
        match outcome {
            AdapterOutcome::Partial {
                quotes,
                missing_terms,
            } => {
                assert_eq!(quotes.len(), 1);
                assert_eq!(missing_terms.into_iter().collect::<Vec<_>>(), vec![60, 90]);
            }
            other => panic!("expected partial, got {}", other.kind()),
        }
    }

    #[test]
    fn test_classify_empty_is_parse_failure() {
        let outcome = classify_extraction(&cdt_entity(), vec![]);
        match outcome {
            AdapterOutcome::Failure { reason, .. } => assert_eq!(reason, FailureReason::Parse),
            other => panic!("expected failure, got {}", other.kind()),
        }
    }

    #[test]
    fn test_classify_keeps_off_list_terms() {
        let outcome =
            classify_extraction(&cdt_entity(), vec![(30, 9.5), (45, 9.6), (60, 9.75), (90, 10.0)]);
        match outcome {
            AdapterOutcome::Success { quotes, .. } => {
                assert!(quotes.iter().any(|q| q.term_days == 45));
            }
            other => panic!("expected success, got {}", other.kind()),
        }
    }

    #[test]
    fn test_failure_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&FailureReason::Network).unwrap(),
            "\"NETWORK\""
        );
        assert_eq!(FailureReason::Timeout.to_string(), "TIMEOUT");
    }
}
