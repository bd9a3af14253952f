//! `tasa show` — render the current snapshot as a ranking table.

use super::RuntimeOptions;
use crate::model::SourceStatus;
use crate::store::SnapshotStore;
use anyhow::Result;

pub fn run(opts: &RuntimeOptions) -> Result<()> {
    let store = SnapshotStore::open(&opts.data_dir)?;
    let Some(snapshot) = store.read_current()? else {
        anyhow::bail!("no snapshot yet — run `tasa scrape` first");
    };

    println!("{:=<64}", "");
    println!("RANKING DE TASAS — MEJORES RENDIMIENTOS");
    println!("{:=<64}", "");
    println!("generado: {}", snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(stats) = snapshot.stats() {
        println!(
            "{} registros de {} entidades | promedio {:.2}% | máx {:.2}% | mín {:.2}%",
            stats.total_records,
            stats.total_entities,
            stats.average_rate_pct,
            stats.max_rate_pct,
            stats.min_rate_pct
        );
    }

    println!("\n{:-<64}", "");
    println!("TOP 10");
    println!("{:-<64}", "");
    for (i, record) in snapshot.ranking().into_iter().take(10).enumerate() {
        let term = if record.term_days == 0 {
            "flexible".to_string()
        } else {
            format!("{} días", record.term_days)
        };
        let stale = if record.source_status == SourceStatus::Stale {
            " (stale)"
        } else {
            ""
        };
        println!(
            "{:>2}. {:<22} {:<20} {:>9} | {:>6.2}% E.A.{stale}",
            i + 1,
            record.entity_name,
            record.product_type.label(),
            term,
            record.annual_rate_pct
        );
    }

    for term in [30u32, 60, 90] {
        let rates = snapshot.comparable_for_term(term);
        if rates.is_empty() {
            continue;
        }
        println!("\n{:-<64}", "");
        println!("MEJORES A {term} DÍAS");
        println!("{:-<64}", "");
        for record in rates.into_iter().take(5) {
            println!(
                "    {:<22} {:>6.2}% E.A.",
                record.entity_name, record.annual_rate_pct
            );
        }
    }
    println!("{:=<64}", "");
    Ok(())
}
