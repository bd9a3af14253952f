//! End-to-end orchestrator behavior with injected adapters.
//!
//! These tests drive full runs against scripted sources: deterministic
//! outcomes, injected previous snapshots, and a tempdir-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasa_runtime::adapter::{AdapterOutcome, FailureReason, RateQuote, SourceAdapter};
use tasa_runtime::config::{EntityConfig, FetchStrategy};
use tasa_runtime::events::EventBus;
use tasa_runtime::model::{ProductType, RateRecord, Snapshot, SourceStatus};
use tasa_runtime::orchestrator::{Orchestrator, OrchestratorError};
use tasa_runtime::registry::AdapterRegistry;
use tasa_runtime::store::SnapshotStore;
use tempfile::TempDir;

const BUDGET: Duration = Duration::from_secs(5);

fn entity(id: &str, product: ProductType, terms: &[u32]) -> EntityConfig {
    EntityConfig {
        entity_id: id.to_string(),
        display_name: id.to_string(),
        product_type: product,
        fetch_strategy: FetchStrategy::Direct,
        source_url: format!("https://{id}.example/rates"),
        term_days: terms.to_vec(),
        timeout_ms: 2_000,
        monthly_yield_pct: None,
    }
}

/// Adapter that returns a scripted outcome immediately.
struct StaticAdapter {
    entity: EntityConfig,
    outcome: AdapterOutcome,
}

impl StaticAdapter {
    fn success(entity: EntityConfig, pairs: &[(u32, f64)]) -> Arc<Self> {
        Arc::new(Self {
            entity,
            outcome: AdapterOutcome::Success {
                quotes: pairs
                    .iter()
                    .map(|&(term_days, annual_rate_pct)| RateQuote {
                        term_days,
                        annual_rate_pct,
                    })
                    .collect(),
                warnings: Vec::new(),
            },
        })
    }

    fn failure(entity: EntityConfig, reason: FailureReason) -> Arc<Self> {
        Arc::new(Self {
            entity,
            outcome: AdapterOutcome::failure(reason, "scripted failure"),
        })
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn entity(&self) -> &EntityConfig {
        &self.entity
    }
    async fn fetch(&self) -> AdapterOutcome {
        self.outcome.clone()
    }
}

/// Adapter that never settles within any realistic test budget.
struct NeverResolves {
    entity: EntityConfig,
}

#[async_trait]
impl SourceAdapter for NeverResolves {
    fn entity(&self) -> &EntityConfig {
        &self.entity
    }
    async fn fetch(&self) -> AdapterOutcome {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        AdapterOutcome::failure(FailureReason::Timeout, "unreachable")
    }
}

/// Adapter that takes a fixed time before succeeding.
struct SlowAdapter {
    entity: EntityConfig,
    delay: Duration,
}

#[async_trait]
impl SourceAdapter for SlowAdapter {
    fn entity(&self) -> &EntityConfig {
        &self.entity
    }
    async fn fetch(&self) -> AdapterOutcome {
        tokio::time::sleep(self.delay).await;
        AdapterOutcome::Success {
            quotes: vec![RateQuote {
                term_days: 0,
                annual_rate_pct: 9.0,
            }],
            warnings: Vec::new(),
        }
    }
}

fn harness(
    dir: &TempDir,
    adapters: Vec<Arc<dyn SourceAdapter>>,
) -> (Arc<Orchestrator>, Arc<SnapshotStore>) {
    let store = Arc::new(SnapshotStore::open(dir.path()).unwrap());
    let registry = Arc::new(AdapterRegistry::with_adapters(adapters).unwrap());
    let bus = Arc::new(EventBus::new(64));
    let orchestrator = Arc::new(Orchestrator::new(registry, Arc::clone(&store), bus));
    (orchestrator, store)
}

fn previous_with(records: Vec<RateRecord>) -> Snapshot {
    Snapshot::new(Utc::now(), records)
}

fn old_record(
    entity_id: &str,
    product: ProductType,
    term: u32,
    rate: f64,
    observed_at: DateTime<Utc>,
) -> RateRecord {
    RateRecord {
        entity_id: entity_id.to_string(),
        entity_name: entity_id.to_string(),
        product_type: product,
        term_days: term,
        annual_rate_pct: rate,
        observed_at,
        source_status: SourceStatus::Ok,
        source_url: format!("https://{entity_id}.example/rates"),
    }
}

fn assert_unique_keys(snapshot: &Snapshot) {
    let keys: BTreeSet<(String, u32)> = snapshot.records.iter().map(|r| r.key()).collect();
    assert_eq!(keys.len(), snapshot.records.len(), "duplicate merge keys");
}

#[tokio::test]
async fn test_full_run_merges_all_fresh_records() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, store) = harness(
        &dir,
        vec![
            StaticAdapter::success(
                entity("bancolombia", ProductType::Cdt, &[30, 60, 90]),
                &[(30, 9.5), (60, 9.75), (90, 10.0)],
            ),
            StaticAdapter::success(entity("nubank", ProductType::Savings, &[]), &[(0, 9.25)]),
        ],
    );

    let (snapshot, report) = orchestrator.run(None, BUDGET).await.unwrap();

    assert_eq!(snapshot.records.len(), 4);
    assert_unique_keys(&snapshot);
    assert!(snapshot
        .records
        .iter()
        .all(|r| r.source_status == SourceStatus::Ok));
    assert!(snapshot
        .records
        .iter()
        .all(|r| r.observed_at == snapshot.generated_at));

    let at_30 = snapshot.comparable_for_term(30);
    let bancolombia = at_30
        .iter()
        .find(|r| r.entity_id == "bancolombia")
        .expect("bancolombia in term-30 comparison");
    assert_eq!(bancolombia.annual_rate_pct, 9.5);

    assert!(report.succeeded());
    assert_eq!(report.fresh_entities, 2);
    assert_eq!(report.failed_entities, 0);
    assert!(report.persisted);

    // The persisted snapshot round-trips identically.
    let stored = store.read_current().unwrap().unwrap();
    assert_eq!(stored.records.len(), 4);
    assert_eq!(stored.generated_at, snapshot.generated_at);
}

#[tokio::test]
async fn test_failed_entity_carries_stale_record_forward() {
    let dir = TempDir::new().unwrap();
    let t0 = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let previous = previous_with(vec![old_record(
        "nubank",
        ProductType::Savings,
        0,
        9.25,
        t0,
    )]);

    let (orchestrator, _) = harness(
        &dir,
        vec![StaticAdapter::failure(
            entity("nubank", ProductType::Savings, &[]),
            FailureReason::Network,
        )],
    );

    let (snapshot, report) = orchestrator.run(Some(&previous), BUDGET).await.unwrap();

    let carried = snapshot.get("nubank", 0).expect("stale record present");
    assert_eq!(carried.source_status, SourceStatus::Stale);
    assert_eq!(carried.annual_rate_pct, 9.25);
    // Original observation instant survives the carry.
    assert_eq!(carried.observed_at, t0);

    assert!(report.succeeded());
    assert_eq!(report.stale_entities, 1);
    assert_eq!(report.entities[0].outcome, "failure");
    assert_eq!(report.entities[0].failure_reason, Some(FailureReason::Network));
}

#[tokio::test]
async fn test_partial_outcome_fills_missing_terms_from_previous() {
    let dir = TempDir::new().unwrap();
    let t0 = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let previous = previous_with(vec![
        old_record("bancolombia", ProductType::Cdt, 30, 9.0, t0),
        old_record("bancolombia", ProductType::Cdt, 60, 9.3, t0),
    ]);

    let config = entity("bancolombia", ProductType::Cdt, &[30, 60, 90]);
    let partial = Arc::new(StaticAdapter {
        entity: config,
        outcome: AdapterOutcome::Partial {
            quotes: vec![RateQuote {
                term_days: 30,
                annual_rate_pct: 9.5,
            }],
            missing_terms: [60u32, 90].into_iter().collect(),
        },
    });

    let (orchestrator, _) = harness(&dir, vec![partial]);
    let (snapshot, report) = orchestrator.run(Some(&previous), BUDGET).await.unwrap();

    assert_unique_keys(&snapshot);
    // Fresh 30d replaces the old quote.
    let fresh = snapshot.get("bancolombia", 30).unwrap();
    assert_eq!(fresh.source_status, SourceStatus::Ok);
    assert_eq!(fresh.annual_rate_pct, 9.5);
    // 60d falls back to stale; 90d never existed and stays absent.
    let stale = snapshot.get("bancolombia", 60).unwrap();
    assert_eq!(stale.source_status, SourceStatus::Stale);
    assert_eq!(stale.observed_at, t0);
    assert!(snapshot.get("bancolombia", 90).is_none());

    assert!(report.warnings.iter().any(|w| w.contains("missing terms")));
}

#[tokio::test]
async fn test_all_failures_leave_store_untouched() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, store) = harness(
        &dir,
        vec![
            StaticAdapter::failure(
                entity("bancolombia", ProductType::Cdt, &[30]),
                FailureReason::Network,
            ),
            StaticAdapter::failure(
                entity("nubank", ProductType::Savings, &[]),
                FailureReason::Timeout,
            ),
        ],
    );

    // Seed the store with a pre-run snapshot.
    let seeded = previous_with(vec![old_record(
        "other",
        ProductType::Cdt,
        30,
        8.0,
        Utc::now(),
    )]);
    store.write_current(&seeded).unwrap();

    let (snapshot, report) = orchestrator.run(None, BUDGET).await.unwrap();

    assert!(snapshot.is_empty());
    assert!(!report.succeeded());
    assert!(!report.persisted);
    assert_eq!(report.failed_entities, 2);

    // Pre-run snapshot still served.
    let after = store.read_current().unwrap().unwrap();
    assert_eq!(after.records.len(), 1);
    assert_eq!(after.records[0].entity_id, "other");
}

#[tokio::test]
async fn test_budget_excludes_never_resolving_adapter() {
    let dir = TempDir::new().unwrap();
    let mut slow_entity = entity("slowbank", ProductType::Cdt, &[30]);
    slow_entity.timeout_ms = 60_000; // own timeout far beyond the run budget

    let (orchestrator, _) = harness(
        &dir,
        vec![
            StaticAdapter::success(entity("nubank", ProductType::Savings, &[]), &[(0, 9.25)]),
            Arc::new(NeverResolves {
                entity: slow_entity,
            }),
        ],
    );

    let started = Instant::now();
    let (snapshot, report) = orchestrator
        .run(None, Duration::from_millis(300))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // The run settles shortly after the budget, not after the straggler.
    assert!(elapsed < Duration::from_secs(3), "run took {elapsed:?}");

    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].entity_id, "nubank");

    let slow = report
        .entities
        .iter()
        .find(|e| e.entity_id == "slowbank")
        .unwrap();
    assert_eq!(slow.outcome, "failure");
    assert_eq!(slow.failure_reason, Some(FailureReason::Timeout));
}

#[tokio::test]
async fn test_adapter_timeout_plus_grace_is_enforced_per_adapter() {
    let dir = TempDir::new().unwrap();
    let mut config = entity("slowbank", ProductType::Savings, &[]);
    config.timeout_ms = 100;

    let store = Arc::new(SnapshotStore::open(dir.path()).unwrap());
    let registry = Arc::new(
        AdapterRegistry::with_adapters(vec![Arc::new(SlowAdapter {
            entity: config,
            delay: Duration::from_secs(10),
        })])
        .unwrap(),
    );
    let orchestrator = Orchestrator::new(registry, store, Arc::new(EventBus::new(16)))
        .with_fetch_grace(Duration::from_millis(100));

    let (snapshot, report) = orchestrator.run(None, BUDGET).await.unwrap();

    assert!(snapshot.is_empty());
    let slow = &report.entities[0];
    assert_eq!(slow.failure_reason, Some(FailureReason::Timeout));
    // The adapter was cut off at timeout + grace, well before its delay.
    assert!(report.elapsed_ms < 5_000);
}

#[tokio::test]
async fn test_identical_inputs_produce_identical_snapshots_modulo_observation_time() {
    let adapters = |dir: &TempDir| {
        harness(
            dir,
            vec![
                StaticAdapter::success(
                    entity("bancolombia", ProductType::Cdt, &[30, 60, 90]),
                    &[(30, 9.5), (60, 9.75), (90, 10.0)],
                ),
                StaticAdapter::success(entity("nubank", ProductType::Savings, &[]), &[(0, 9.25)]),
            ],
        )
    };

    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let (orchestrator_a, _) = adapters(&dir_a);
    let (orchestrator_b, _) = adapters(&dir_b);

    let (snap_a, _) = orchestrator_a.run(None, BUDGET).await.unwrap();
    let (snap_b, _) = orchestrator_b.run(None, BUDGET).await.unwrap();

    let shape = |s: &Snapshot| {
        s.records
            .iter()
            .map(|r| {
                (
                    r.entity_id.clone(),
                    r.term_days,
                    r.annual_rate_pct.to_bits(),
                    r.source_status,
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&snap_a), shape(&snap_b));
}

#[tokio::test]
async fn test_duplicate_terms_keep_later_value_with_warning() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = harness(
        &dir,
        vec![StaticAdapter::success(
            entity("buggy", ProductType::Cdt, &[30]),
            &[(30, 9.0), (30, 9.4)],
        )],
    );

    let (snapshot, report) = orchestrator.run(None, BUDGET).await.unwrap();

    assert_unique_keys(&snapshot);
    assert_eq!(snapshot.get("buggy", 30).unwrap().annual_rate_pct, 9.4);
    assert!(report.warnings.iter().any(|w| w.contains("duplicate term")));
}

#[tokio::test]
async fn test_invalid_rate_falls_back_to_stale() {
    let dir = TempDir::new().unwrap();
    let t0 = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let previous = previous_with(vec![old_record(
        "bancolombia",
        ProductType::Cdt,
        30,
        9.0,
        t0,
    )]);

    let (orchestrator, _) = harness(
        &dir,
        vec![StaticAdapter::success(
            entity("bancolombia", ProductType::Cdt, &[30]),
            &[(30, 250.0)], // beyond the sanity ceiling
        )],
    );

    let (snapshot, report) = orchestrator.run(Some(&previous), BUDGET).await.unwrap();

    let record = snapshot.get("bancolombia", 30).unwrap();
    assert_eq!(record.source_status, SourceStatus::Stale);
    assert_eq!(record.annual_rate_pct, 9.0);
    assert!(report.warnings.iter().any(|w| w.contains("rejected term 30")));
}

#[tokio::test]
async fn test_off_list_terms_merge_with_warning() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = harness(
        &dir,
        vec![StaticAdapter::success(
            entity("bancolombia", ProductType::Cdt, &[30, 60, 90]),
            &[(30, 9.5), (45, 9.6), (60, 9.75), (90, 10.0)],
        )],
    );

    let (snapshot, report) = orchestrator.run(None, BUDGET).await.unwrap();

    assert!(snapshot.get("bancolombia", 45).is_some());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("term 45 not in configured list")));
}

#[tokio::test]
async fn test_concurrent_run_requests_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = harness(
        &dir,
        vec![Arc::new(SlowAdapter {
            entity: entity("slowbank", ProductType::Savings, &[]),
            delay: Duration::from_millis(500),
        })],
    );

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(None, BUDGET).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    match orchestrator.run(None, BUDGET).await {
        Err(OrchestratorError::RunInProgress) => {}
        other => panic!("expected RunInProgress, got {:?}", other.map(|_| ())),
    }

    // The first run still completes normally.
    let (snapshot, _) = first.await.unwrap().unwrap();
    assert_eq!(snapshot.records.len(), 1);
}

#[tokio::test]
async fn test_stale_records_can_survive_multiple_failed_runs() {
    let dir = TempDir::new().unwrap();
    let t0 = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let previous = previous_with(vec![old_record(
        "nubank",
        ProductType::Savings,
        0,
        9.25,
        t0,
    )]);

    let (orchestrator, _) = harness(
        &dir,
        vec![StaticAdapter::failure(
            entity("nubank", ProductType::Savings, &[]),
            FailureReason::Parse,
        )],
    );

    // Run 2 carries stale; run 3 carries the same record again.
    let (snap2, _) = orchestrator.run(Some(&previous), BUDGET).await.unwrap();
    let (snap3, _) = orchestrator.run(Some(&snap2), BUDGET).await.unwrap();

    let record = snap3.get("nubank", 0).unwrap();
    assert_eq!(record.source_status, SourceStatus::Stale);
    assert_eq!(record.annual_rate_pct, 9.25);
    assert_eq!(record.observed_at, t0);
}
