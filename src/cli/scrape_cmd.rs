//! `tasa scrape` — run one complete scrape and print the report.

use super::{build_runtime, RuntimeOptions};
use anyhow::Result;
use std::time::Duration;

pub async fn run(opts: &RuntimeOptions, budget_ms: u64) -> Result<()> {
    let runtime = build_runtime(opts).await?;

    let previous = runtime.store.read_current()?;
    let (snapshot, report) = runtime
        .orchestrator
        .run(previous.as_ref(), Duration::from_millis(budget_ms))
        .await?;

    println!(
        "run {} — {} records from {} entities in {:.1}s",
        report.run_id,
        report.total_records,
        report.fresh_entities + report.stale_entities,
        report.elapsed_ms as f64 / 1000.0
    );
    for entity in &report.entities {
        let mark = match (entity.fresh_records, entity.stale_records) {
            (0, 0) => "✗",
            (0, _) => "~",
            _ => "✓",
        };
        let detail = match (&entity.failure_reason, &entity.failure_detail) {
            (Some(reason), Some(detail)) => format!("  [{reason}] {detail}"),
            _ => String::new(),
        };
        println!(
            "  {mark} {:<14} fresh {:<2} stale {:<2} ({} ms){detail}",
            entity.entity_id, entity.fresh_records, entity.stale_records, entity.elapsed_ms
        );
    }
    for warning in &report.warnings {
        println!("  ! {warning}");
    }
    if let Some(err) = &report.store_error {
        println!("  ! store: {err}");
    }

    if !report.succeeded() {
        anyhow::bail!("run produced no usable data; previous snapshot left in place");
    }
    if report.persisted {
        println!(
            "snapshot written: {} ({} records)",
            runtime.store.current_path().display(),
            snapshot.records.len()
        );
    }
    Ok(())
}
