//! `tasa list` — show the registered entity table.

use super::{resolve_entities, RuntimeOptions};
use crate::config::FetchStrategy;
use anyhow::Result;

pub fn run(opts: &RuntimeOptions) -> Result<()> {
    let entities = resolve_entities(opts)?;

    println!("{} registered entities\n", entities.len());
    for entity in &entities {
        let strategy = match entity.fetch_strategy {
            FetchStrategy::Direct => "direct",
            FetchStrategy::Rendered => "rendered",
            FetchStrategy::Derived => "derived",
        };
        let terms = if entity.term_days.is_empty() {
            "flexible".to_string()
        } else {
            entity
                .term_days
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join("/")
        };
        println!(
            "{:<14} {:<22} {:<20} {:<9} terms {}",
            entity.entity_id,
            entity.display_name,
            entity.product_type.label(),
            strategy,
            terms
        );
        println!("               {}", entity.source_url);
    }
    Ok(())
}
