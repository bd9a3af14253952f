//! Entity and runtime configuration.
//!
//! The built-in entity table mirrors the sources the system tracks in
//! production; `--entities <file>` swaps it for a JSON list with the same
//! shape, so adding a source is a config change, not a code change.

use crate::model::ProductType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default whole-run budget.
pub const DEFAULT_RUN_BUDGET_MS: u64 = 60_000;

/// Extra slack granted to an adapter on top of its own timeout before the
/// orchestrator writes it off as timed out.
pub const DEFAULT_FETCH_GRACE_MS: u64 = 2_000;

/// How a source's page is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Plain document GET; markup is complete without JavaScript.
    Direct,
    /// Page builds its numbers client-side; needs a browser-driven fetch.
    Rendered,
    /// No page fetch; the figure is derived from a configured input.
    Derived,
}

/// Configuration for one registered entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Stable identifier; doubles as the merge-key prefix.
    pub entity_id: String,
    /// Display name shown in rankings.
    pub display_name: String,
    pub product_type: ProductType,
    pub fetch_strategy: FetchStrategy,
    /// Page the rates are published on.
    pub source_url: String,
    /// Terms (in days) this source is expected to quote. Empty means a flat,
    /// term-independent product that emits a single term-0 record.
    #[serde(default)]
    pub term_days: Vec<u32>,
    /// Per-adapter fetch timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Monthly yield input for the derived strategy, in percent per month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_yield_pct: Option<f64>,
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl EntityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sanity-check a config entry before it backs an adapter.
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.is_empty() {
            anyhow::bail!("entity with empty entity_id");
        }
        url::Url::parse(&self.source_url)
            .with_context(|| format!("{}: invalid source_url {:?}", self.entity_id, self.source_url))?;
        if self.fetch_strategy == FetchStrategy::Derived && self.monthly_yield_pct.is_none() {
            tracing::warn!(
                entity = %self.entity_id,
                "derived entity has no monthly_yield_pct; every run will fail validation"
            );
        }
        Ok(())
    }
}

/// Resolve the data directory: `TASA_DATA_DIR`, then `~/.tasa/data`,
/// then `./data` as a last resort.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TASA_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(".tasa/data"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Load an entity table from a JSON file.
pub fn load_entities(path: &Path) -> Result<Vec<EntityConfig>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading entity config: {}", path.display()))?;
    let entities: Vec<EntityConfig> = serde_json::from_str(&data)
        .with_context(|| format!("parsing entity config: {}", path.display()))?;
    Ok(entities)
}

/// The built-in entity table.
///
/// URLs and terms follow the production sources: traditional banks quote a
/// 30/60/90-day CDT ladder, neobanks quote one flat savings rate, Atomy Rent
/// quotes a flat fiduciary yield, and the real-estate figure is derived from
/// the Fedelonjas gross rental yield (~0.5% of commercial value per month).
pub fn default_entities() -> Vec<EntityConfig> {
    let cdt = |id: &str, name: &str, url: &str, rendered: bool| EntityConfig {
        entity_id: id.to_string(),
        display_name: name.to_string(),
        product_type: ProductType::Cdt,
        fetch_strategy: if rendered {
            FetchStrategy::Rendered
        } else {
            FetchStrategy::Direct
        },
        source_url: url.to_string(),
        term_days: vec![30, 60, 90],
        timeout_ms: if rendered { 20_000 } else { 15_000 },
        monthly_yield_pct: None,
    };
    let savings = |id: &str, name: &str, url: &str| EntityConfig {
        entity_id: id.to_string(),
        display_name: name.to_string(),
        product_type: ProductType::Savings,
        fetch_strategy: FetchStrategy::Direct,
        source_url: url.to_string(),
        term_days: Vec::new(),
        timeout_ms: 15_000,
        monthly_yield_pct: None,
    };

    vec![
        cdt(
            "bancolombia",
            "Bancolombia",
            "https://www.bancolombia.com/personas/productos-servicios/inversiones/cdt",
            true,
        ),
        cdt(
            "davivienda",
            "Davivienda",
            "https://www.davivienda.com/wps/portal/personas/nuevo/personas/quiero_invertir/cdt",
            true,
        ),
        cdt(
            "bbva",
            "BBVA Colombia",
            "https://www.bbva.com.co/personas/productos/inversion/cdt.html",
            false,
        ),
        cdt(
            "ban100",
            "Ban100",
            "https://www.ban100.com.co/cdt",
            false,
        ),
        cdt(
            "finandina",
            "Banco Finandina",
            "https://www.bancofinandina.com/personas/cdt",
            false,
        ),
        savings("nubank", "Nubank (Cajitas)", "https://nu.com.co/"),
        savings("pibank", "Pibank", "https://www.pibank.co/"),
        savings("lulobank", "Lulo Bank", "https://www.lulobank.com/"),
        EntityConfig {
            entity_id: "atomyrent".to_string(),
            display_name: "Atomy Rent".to_string(),
            product_type: ProductType::Fiduciary,
            fetch_strategy: FetchStrategy::Direct,
            source_url: "https://atomyrent.com/".to_string(),
            term_days: Vec::new(),
            timeout_ms: 15_000,
            monthly_yield_pct: None,
        },
        EntityConfig {
            entity_id: "finca_raiz".to_string(),
            display_name: "Finca Raíz Colombia".to_string(),
            product_type: ProductType::RealEstate,
            fetch_strategy: FetchStrategy::Derived,
            source_url: "https://www.fedelonjas.org.co/".to_string(),
            term_days: Vec::new(),
            timeout_ms: 1_000,
            monthly_yield_pct: Some(0.5),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entities_are_valid_and_unique() {
        let entities = default_entities();
        assert!(entities.len() >= 8);

        let mut ids: Vec<&str> = entities.iter().map(|e| e.entity_id.as_str()).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len(), "duplicate entity_id in default table");

        for entity in &entities {
            entity.validate().unwrap();
        }
    }

    #[test]
    fn test_entity_config_roundtrip() {
        let entities = default_entities();
        let json = serde_json::to_string_pretty(&entities).unwrap();
        let back: Vec<EntityConfig> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), entities.len());
        assert_eq!(back[0].entity_id, entities[0].entity_id);
    }

    #[test]
    fn test_invalid_source_url_rejected() {
        let mut entity = default_entities().remove(0);
        entity.source_url = "not a url".to_string();
        assert!(entity.validate().is_err());
    }

    #[test]
    fn test_config_defaults_fill_in() {
        let json = r#"{
            "entity_id": "x",
            "display_name": "X",
            "product_type": "SAVINGS",
            "fetch_strategy": "direct",
            "source_url": "https://x.example/"
        }"#;
        let entity: EntityConfig = serde_json::from_str(json).unwrap();
        assert!(entity.term_days.is_empty());
        assert_eq!(entity.timeout_ms, 15_000);
        assert!(entity.monthly_yield_pct.is_none());
    }
}
