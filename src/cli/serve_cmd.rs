//! `tasa serve` — HTTP API plus optional scheduled scraping.

use super::{build_runtime, RuntimeOptions};
use crate::rest::{self, ApiState};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn run(
    opts: &RuntimeOptions,
    port: u16,
    every_minutes: Option<u64>,
    budget_ms: u64,
) -> Result<()> {
    let runtime = build_runtime(opts).await?;
    let run_budget = Duration::from_millis(budget_ms);

    let state = Arc::new(ApiState {
        store: Arc::clone(&runtime.store),
        registry: Arc::clone(&runtime.registry),
        orchestrator: Arc::clone(&runtime.orchestrator),
        bus: Arc::clone(&runtime.bus),
        run_budget,
    });

    // Scheduled runs tick on an interval and simply skip when a manual run
    // is already holding the lock — never two runs at once.
    if let Some(minutes) = every_minutes {
        let orchestrator = Arc::clone(&runtime.orchestrator);
        let store = Arc::clone(&runtime.store);
        let every = Duration::from_secs(minutes.max(1) * 60);
        info!("scheduled scraping every {} minutes", minutes.max(1));

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await; // first tick fires immediately; skip it
            loop {
                tick.tick().await;
                let previous = match store.read_current() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("scheduled run skipped, could not read previous snapshot: {e}");
                        continue;
                    }
                };
                match orchestrator.run(previous.as_ref(), run_budget).await {
                    Ok((_, report)) if report.succeeded() => {}
                    Ok(_) => warn!("scheduled run yielded no usable data"),
                    Err(e) => info!("scheduled run skipped: {e}"),
                }
            }
        });
    }

    rest::serve(port, state).await
}
