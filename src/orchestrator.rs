//! Scraping orchestrator — drives one complete run to a merged snapshot.
//!
//! Fan-out/fan-in: every registered adapter is dispatched as its own task,
//! the whole collection is bounded by a hard run budget, and whatever
//! settled in time is merged deterministically. A failing source degrades
//! to stale data for its own keys and nothing else; the run itself never
//! aborts because one page broke.

use crate::adapter::{AdapterOutcome, FailureReason};
use crate::events::{EventBus, RateEvent};
use crate::model::{RateRecord, Snapshot, SourceStatus, ValidationLimits};
use crate::registry::AdapterRegistry;
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Errors a run request can fail with before any work happens.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// At most one run executes at a time; concurrent requests are rejected,
    /// not queued.
    #[error("a scraping run is already in progress")]
    RunInProgress,
}

/// Per-entity outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityReport {
    pub entity_id: String,
    /// Adapter outcome kind: "success", "partial", or "failure".
    pub outcome: String,
    pub fresh_records: usize,
    pub stale_records: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

/// Everything observable about one run. Not part of the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub entities: Vec<EntityReport>,
    /// Entities that contributed at least one fresh record.
    pub fresh_entities: usize,
    /// Entities fully carried by stale data this run.
    pub stale_entities: usize,
    /// Entities with neither fresh nor stale records.
    pub failed_entities: usize,
    pub total_records: usize,
    pub warnings: Vec<String>,
    /// Whether the snapshot reached disk.
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

impl RunReport {
    /// A run succeeds when it produced any usable record, fresh or stale.
    pub fn succeeded(&self) -> bool {
        self.total_records > 0
    }
}

/// Drives registered adapters to a merged [`Snapshot`].
pub struct Orchestrator {
    registry: Arc<AdapterRegistry>,
    store: Arc<SnapshotStore>,
    bus: Arc<EventBus>,
    limits: ValidationLimits,
    fetch_grace: Duration,
    run_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<SnapshotStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            bus,
            limits: ValidationLimits::default(),
            fetch_grace: Duration::from_millis(crate::config::DEFAULT_FETCH_GRACE_MS),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_fetch_grace(mut self, grace: Duration) -> Self {
        self.fetch_grace = grace;
        self
    }

    /// Run one complete scrape: dispatch, collect under the budget, merge
    /// against the previous snapshot, persist.
    ///
    /// The caller supplies the previous snapshot explicitly (usually from
    /// [`SnapshotStore::read_current`]); the orchestrator never reads
    /// ambient storage mid-run.
    pub async fn run(
        &self,
        previous: Option<&Snapshot>,
        budget: Duration,
    ) -> Result<(Snapshot, RunReport), OrchestratorError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| OrchestratorError::RunInProgress)?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = tokio::time::Instant::now();
        let deadline = started + budget;

        info!(run_id = %run_id, entities = self.registry.len(), budget_ms = budget.as_millis() as u64, "scraping run started");
        self.bus.emit(RateEvent::RunStarted {
            run_id: run_id.clone(),
            entity_count: self.registry.len(),
        });

        // 1. Fan out: one task per adapter, each capped at its own timeout
        // plus grace. Tasks never share state.
        let mut join: JoinSet<(String, AdapterOutcome, u64)> = JoinSet::new();
        for adapter in self.registry.list() {
            let adapter = Arc::clone(adapter);
            let grace = self.fetch_grace;
            join.spawn(async move {
                let entity_id = adapter.entity().entity_id.clone();
                let cap = adapter.entity().timeout() + grace;
                let t0 = tokio::time::Instant::now();
                let outcome = match tokio::time::timeout(cap, adapter.fetch()).await {
                    Ok(outcome) => outcome,
                    Err(_) => AdapterOutcome::failure(
                        FailureReason::Timeout,
                        format!("no outcome within {}ms", cap.as_millis()),
                    ),
                };
                (entity_id, outcome, t0.elapsed().as_millis() as u64)
            });
        }

        // 2. Fan in until everything settled or the budget expires.
        let mut outcomes: HashMap<String, (AdapterOutcome, u64)> = HashMap::new();
        loop {
            match tokio::time::timeout_at(deadline, join.join_next()).await {
                Ok(Some(Ok((entity_id, outcome, elapsed_ms)))) => {
                    self.bus.emit(RateEvent::AdapterFinished {
                        run_id: run_id.clone(),
                        entity_id: entity_id.clone(),
                        outcome: outcome.kind().to_string(),
                        quotes: match &outcome {
                            AdapterOutcome::Success { quotes, .. }
                            | AdapterOutcome::Partial { quotes, .. } => quotes.len(),
                            AdapterOutcome::Failure { .. } => 0,
                        },
                        elapsed_ms,
                    });
                    outcomes.insert(entity_id, (outcome, elapsed_ms));
                }
                Ok(Some(Err(join_err))) => {
                    // Adapter tasks convert their own errors; a join error
                    // means the task itself died. The entity falls through
                    // to the missing-outcome path below.
                    warn!(run_id = %run_id, "adapter task failed: {join_err}");
                }
                Ok(None) => break,
                Err(_) => {
                    // Budget exceeded: stop waiting. Stragglers keep running
                    // detached so fetch sessions can clean up after
                    // themselves; their eventual results are discarded.
                    warn!(run_id = %run_id, settled = outcomes.len(), total = self.registry.len(), "run budget exceeded, discarding outstanding adapters");
                    join.detach_all();
                    break;
                }
            }
        }

        // 3–5. Validate, apply the stale policy, merge by key.
        let observed_at = Utc::now();
        let mut records: Vec<RateRecord> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut entities: Vec<EntityReport> = Vec::new();
        let (mut fresh_entities, mut stale_entities, mut failed_entities) = (0usize, 0usize, 0usize);

        for adapter in self.registry.list() {
            let cfg = adapter.entity();
            let entity_id = cfg.entity_id.clone();
            let (outcome, elapsed_ms) = outcomes.remove(&entity_id).unwrap_or_else(|| {
                (
                    AdapterOutcome::failure(FailureReason::Timeout, "run budget exceeded"),
                    budget.as_millis() as u64,
                )
            });

            let kind = outcome.kind().to_string();
            let mut failure_reason = None;
            let mut failure_detail = None;
            // term → rate, deduplicated; later-listed quotes win.
            let mut fresh: BTreeMap<u32, f64> = BTreeMap::new();

            match outcome {
                AdapterOutcome::Success {
                    quotes,
                    warnings: adapter_warnings,
                } => {
                    warnings.extend(adapter_warnings.into_iter().map(|w| format!("{entity_id}: {w}")));
                    self.admit_quotes(cfg, quotes, &mut fresh, &mut warnings);
                }
                AdapterOutcome::Partial {
                    quotes,
                    missing_terms,
                } => {
                    warnings.push(format!(
                        "{entity_id}: missing terms {:?}",
                        missing_terms.iter().collect::<Vec<_>>()
                    ));
                    self.admit_quotes(cfg, quotes, &mut fresh, &mut warnings);
                }
                AdapterOutcome::Failure { reason, detail } => {
                    warn!(entity = %entity_id, %reason, detail = %detail, "adapter failed");
                    failure_reason = Some(reason);
                    failure_detail = Some(detail);
                }
            }

            let fresh_count = fresh.len();
            for (&term_days, &annual_rate_pct) in &fresh {
                records.push(RateRecord {
                    entity_id: entity_id.clone(),
                    entity_name: cfg.display_name.clone(),
                    product_type: cfg.product_type,
                    term_days,
                    annual_rate_pct,
                    observed_at,
                    source_status: SourceStatus::Ok,
                    source_url: cfg.source_url.clone(),
                });
            }

            // Stale fallback: previous-snapshot keys of this entity that
            // got no valid fresh record carry forward unchanged except for
            // their status. `observed_at` keeps the original instant.
            let mut stale_count = 0;
            if let Some(prev) = previous {
                for old in prev.records_for_entity(&entity_id) {
                    if !fresh.contains_key(&old.term_days) {
                        let mut carried = old.clone();
                        carried.source_status = SourceStatus::Stale;
                        records.push(carried);
                        stale_count += 1;
                    }
                }
            }

            if fresh_count > 0 {
                fresh_entities += 1;
            } else if stale_count > 0 {
                stale_entities += 1;
            } else {
                failed_entities += 1;
            }

            entities.push(EntityReport {
                entity_id,
                outcome: kind,
                fresh_records: fresh_count,
                stale_records: stale_count,
                elapsed_ms,
                failure_reason,
                failure_detail,
            });
        }

        let snapshot = Snapshot::new(observed_at, records);

        // 7. Persist, unless the run yielded nothing at all — an empty
        // snapshot must never wipe the previous one.
        let mut persisted = false;
        let mut store_error = None;
        if snapshot.is_empty() {
            warn!(run_id = %run_id, "run produced no records; store left untouched");
        } else {
            match self.store.write_current(&snapshot) {
                Ok(()) => {
                    persisted = true;
                    if let Err(e) = self.store.append_history(&snapshot, observed_at) {
                        error!(run_id = %run_id, "history append failed: {e}");
                        store_error = Some(e.to_string());
                    }
                }
                Err(e) => {
                    error!(run_id = %run_id, "snapshot write failed: {e}");
                    store_error = Some(e.to_string());
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let report = RunReport {
            run_id: run_id.clone(),
            started_at,
            elapsed_ms,
            entities,
            fresh_entities,
            stale_entities,
            failed_entities,
            total_records: snapshot.records.len(),
            warnings,
            persisted,
            store_error,
        };

        if report.succeeded() {
            info!(
                run_id = %run_id,
                records = report.total_records,
                fresh = fresh_entities,
                stale = stale_entities,
                failed = failed_entities,
                elapsed_ms,
                "scraping run completed"
            );
            self.bus.emit(RateEvent::RunCompleted {
                run_id,
                total_records: report.total_records,
                fresh_entities,
                stale_entities,
                failed_entities,
                persisted,
                elapsed_ms,
            });
        } else {
            warn!(run_id = %run_id, elapsed_ms, "scraping run yielded no usable data");
            self.bus.emit(RateEvent::RunFailed { run_id, elapsed_ms });
        }

        Ok((snapshot, report))
    }

    /// Validate one adapter's quotes into the per-term map.
    ///
    /// Invalid figures are dropped with a warning (their keys fall through
    /// to the stale policy); duplicated terms keep the later-listed value;
    /// terms outside the configured list are kept but flagged.
    fn admit_quotes(
        &self,
        cfg: &crate::config::EntityConfig,
        quotes: Vec<crate::adapter::RateQuote>,
        fresh: &mut BTreeMap<u32, f64>,
        warnings: &mut Vec<String>,
    ) {
        for quote in quotes {
            if let Err(reason) = self.limits.check(quote.annual_rate_pct) {
                warnings.push(format!(
                    "{}: rejected term {}: {reason}",
                    cfg.entity_id, quote.term_days
                ));
                continue;
            }
            if !cfg.term_days.is_empty() && !cfg.term_days.contains(&quote.term_days) {
                warnings.push(format!(
                    "{}: term {} not in configured list",
                    cfg.entity_id, quote.term_days
                ));
            }
            if fresh.insert(quote.term_days, quote.annual_rate_pct).is_some() {
                warnings.push(format!(
                    "{}: duplicate term {}, keeping later value",
                    cfg.entity_id, quote.term_days
                ));
            }
        }
    }
}
