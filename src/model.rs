//! Normalized rate records and snapshots.
//!
//! Pure data: everything an adapter produces and the store persists is built
//! from these shapes. Behavior lives in the orchestrator; the only logic here
//! is the merge key, the validation predicate, and read-only projections used
//! by the API layer and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product category a rate quote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    /// Certificado de Depósito a Término — term deposit with a rate per term.
    #[serde(rename = "CDT")]
    Cdt,
    /// Neobank savings account — one flat rate, money always available.
    #[serde(rename = "SAVINGS")]
    Savings,
    /// Fractional fiduciary rights (derechos fiduciarios).
    #[serde(rename = "FIDUCIARY")]
    Fiduciary,
    /// Rental-yield estimate for residential real estate.
    #[serde(rename = "REAL_ESTATE")]
    RealEstate,
}

impl ProductType {
    /// Human-readable label, as shown in the ranking table.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cdt => "CDT",
            Self::Savings => "Cuenta de ahorro",
            Self::Fiduciary => "Derechos fiduciarios",
            Self::RealEstate => "Finca raíz",
        }
    }
}

/// Freshness of a record inside a snapshot.
///
/// `Failed` never appears in a persisted snapshot — it exists so run reports
/// can name entities that produced nothing this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    /// Fetched fresh during this run.
    #[serde(rename = "OK")]
    Ok,
    /// Carried forward from the previous snapshot after a failed fetch.
    #[serde(rename = "STALE")]
    Stale,
    /// No usable data; recorded in the run report only.
    #[serde(rename = "FAILED")]
    Failed,
}

/// Merge key: one record per `(entity_id, term_days)` pair in a snapshot.
pub type RateKey = (String, u32);

/// One quoted rate for one entity at one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    /// Stable identifier assigned at registration (e.g. "bancolombia").
    pub entity_id: String,
    /// Display name (e.g. "Bancolombia").
    pub entity_name: String,
    /// Product category.
    pub product_type: ProductType,
    /// Investment horizon in days; 0 for flat, term-independent products.
    pub term_days: u32,
    /// Normalized effective-annual rate, in percent.
    pub annual_rate_pct: f64,
    /// When this figure was observed. Set by the orchestrator at merge time;
    /// stale records keep the instant of their original observation.
    pub observed_at: DateTime<Utc>,
    /// Freshness of this record.
    pub source_status: SourceStatus,
    /// Page the figure was extracted from.
    pub source_url: String,
}

impl RateRecord {
    /// The snapshot merge key for this record.
    pub fn key(&self) -> RateKey {
        (self.entity_id.clone(), self.term_days)
    }
}

/// Sanity bounds for extracted rates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationLimits {
    /// Upper bound for `annual_rate_pct`. Anything above is treated as an
    /// extraction error, not a real quote.
    pub rate_ceiling_pct: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            rate_ceiling_pct: 100.0,
        }
    }
}

impl ValidationLimits {
    /// Validation predicate for a candidate rate figure.
    ///
    /// Rejects non-finite, non-positive, and above-ceiling values. Returns
    /// the rejection reason as text for the run report.
    pub fn check(&self, annual_rate_pct: f64) -> Result<(), String> {
        if !annual_rate_pct.is_finite() {
            return Err(format!("rate is not finite: {annual_rate_pct}"));
        }
        if annual_rate_pct <= 0.0 {
            return Err(format!("rate is not positive: {annual_rate_pct}"));
        }
        if annual_rate_pct > self.rate_ceiling_pct {
            return Err(format!(
                "rate {annual_rate_pct} exceeds ceiling {}",
                self.rate_ceiling_pct
            ));
        }
        Ok(())
    }
}

/// The full set of rate records produced by one orchestrator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the run that produced this snapshot merged its results.
    pub generated_at: DateTime<Utc>,
    /// Deduplicated records, sorted by merge key.
    pub records: Vec<RateRecord>,
}

/// Aggregate figures over a snapshot, served by the ranking endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total_records: usize,
    pub total_entities: usize,
    pub average_rate_pct: f64,
    pub max_rate_pct: f64,
    pub min_rate_pct: f64,
}

impl Snapshot {
    /// Build a snapshot from merged records.
    ///
    /// Records are sorted by merge key so the same logical snapshot always
    /// serializes to identical bytes (history files stay diffable).
    pub fn new(generated_at: DateTime<Utc>, mut records: Vec<RateRecord>) -> Self {
        records.sort_by(|a, b| {
            a.entity_id
                .cmp(&b.entity_id)
                .then(a.term_days.cmp(&b.term_days))
        });
        Self {
            generated_at,
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by merge key.
    pub fn get(&self, entity_id: &str, term_days: u32) -> Option<&RateRecord> {
        self.records
            .iter()
            .find(|r| r.entity_id == entity_id && r.term_days == term_days)
    }

    /// Records quoted for exactly this term.
    pub fn records_for_term(&self, term_days: u32) -> Vec<&RateRecord> {
        self.records
            .iter()
            .filter(|r| r.term_days == term_days)
            .collect()
    }

    /// Records comparable at this horizon: exact-term quotes plus flat
    /// (term 0) products, which apply at any horizon. Sorted best-first.
    pub fn comparable_for_term(&self, term_days: u32) -> Vec<&RateRecord> {
        let mut out: Vec<&RateRecord> = self
            .records
            .iter()
            .filter(|r| r.term_days == term_days || r.term_days == 0)
            .collect();
        out.sort_by(|a, b| b.annual_rate_pct.total_cmp(&a.annual_rate_pct));
        out
    }

    /// All records for one entity, in term order.
    pub fn records_for_entity(&self, entity_id: &str) -> Vec<&RateRecord> {
        self.records
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .collect()
    }

    /// All records, best rate first.
    pub fn ranking(&self) -> Vec<&RateRecord> {
        let mut out: Vec<&RateRecord> = self.records.iter().collect();
        out.sort_by(|a, b| b.annual_rate_pct.total_cmp(&a.annual_rate_pct));
        out
    }

    /// Aggregate statistics; `None` for an empty snapshot.
    pub fn stats(&self) -> Option<SnapshotStats> {
        if self.records.is_empty() {
            return None;
        }
        let mut entities: Vec<&str> = self.records.iter().map(|r| r.entity_id.as_str()).collect();
        entities.sort_unstable();
        entities.dedup();

        let sum: f64 = self.records.iter().map(|r| r.annual_rate_pct).sum();
        let max = self
            .records
            .iter()
            .map(|r| r.annual_rate_pct)
            .fold(f64::MIN, f64::max);
        let min = self
            .records
            .iter()
            .map(|r| r.annual_rate_pct)
            .fold(f64::MAX, f64::min);

        Some(SnapshotStats {
            total_records: self.records.len(),
            total_entities: entities.len(),
            average_rate_pct: sum / self.records.len() as f64,
            max_rate_pct: max,
            min_rate_pct: min,
        })
    }
}
