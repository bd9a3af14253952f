// Copyright 2026 Tasa Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API.
//!
//! Thin read layer over the snapshot store plus a manual scrape trigger.
//! Every data endpoint is a pure projection over the current snapshot; the
//! orchestrator is only reached through `POST /api/scrape`, which rejects
//! concurrent requests instead of interleaving runs.

use crate::events::{event_matches_entity, EventBus};
use crate::model::{RateRecord, Snapshot};
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::registry::AdapterRegistry;
use crate::store::SnapshotStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

/// Shared state behind every endpoint.
pub struct ApiState {
    pub store: Arc<SnapshotStore>,
    pub registry: Arc<AdapterRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<EventBus>,
    /// Budget applied to manually triggered runs.
    pub run_budget: Duration,
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/rates", get(list_rates))
        .route("/api/rates/:entity_id", get(rates_for_entity))
        .route("/api/compare/:term", get(compare_term))
        .route("/api/ranking", get(ranking))
        .route("/api/entities", get(entities))
        .route("/api/scrape", post(trigger_scrape))
        .route("/api/events", get(events_sse))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on the given port until the process exits.
pub async fn serve(port: u16, state: Arc<ApiState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn no_data() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "no snapshot available yet; run a scrape first" })),
    )
}

fn load_snapshot(state: &ApiState) -> Result<Snapshot, (StatusCode, Json<Value>)> {
    match state.store.read_current() {
        Ok(Some(snapshot)) => Ok(snapshot),
        Ok(None) => Err(no_data()),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Query parameters for `/api/rates`, matching the original service's API.
#[derive(Debug, Default, Deserialize)]
pub struct RatesParams {
    pub term: Option<u32>,
    pub entity: Option<String>,
    pub min_rate: Option<f64>,
    pub limit: Option<usize>,
    pub sort: Option<String>,
}

/// Filter and order a snapshot's records per the query parameters.
pub fn filter_and_sort(snapshot: &Snapshot, params: &RatesParams) -> Vec<RateRecord> {
    let mut rates: Vec<RateRecord> = snapshot
        .records
        .iter()
        .filter(|r| params.term.map_or(true, |t| r.term_days == t))
        .filter(|r| {
            params
                .entity
                .as_deref()
                .map_or(true, |e| r.entity_id == e)
        })
        .filter(|r| params.min_rate.map_or(true, |m| r.annual_rate_pct >= m))
        .cloned()
        .collect();

    match params.sort.as_deref().unwrap_or("rate_desc") {
        "rate_asc" => rates.sort_by(|a, b| a.annual_rate_pct.total_cmp(&b.annual_rate_pct)),
        "term_asc" => rates.sort_by_key(|r| r.term_days),
        "term_desc" => rates.sort_by_key(|r| std::cmp::Reverse(r.term_days)),
        _ => rates.sort_by(|a, b| b.annual_rate_pct.total_cmp(&a.annual_rate_pct)),
    }
    rates
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn list_rates(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<RatesParams>,
) -> impl IntoResponse {
    let snapshot = match load_snapshot(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let rates = filter_and_sort(&snapshot, &params);
    let total = rates.len();
    let limit = params.limit.unwrap_or(100);
    let rates: Vec<RateRecord> = rates.into_iter().take(limit).collect();

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "generated_at": snapshot.generated_at,
            "count": rates.len(),
            "total": total,
            "rates": rates,
        })),
    )
}

async fn rates_for_entity(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
) -> impl IntoResponse {
    let snapshot = match load_snapshot(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let rates: Vec<&RateRecord> = snapshot.records_for_entity(&entity_id);
    if rates.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no rates for entity {entity_id:?}") })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "entity_id": entity_id,
            "count": rates.len(),
            "rates": rates,
        })),
    )
}

async fn compare_term(
    State(state): State<Arc<ApiState>>,
    Path(term): Path<u32>,
) -> impl IntoResponse {
    let snapshot = match load_snapshot(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let rates: Vec<&RateRecord> = snapshot.comparable_for_term(term);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "term_days": term,
            "count": rates.len(),
            "rates": rates,
        })),
    )
}

async fn ranking(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = match load_snapshot(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let top: Vec<&RateRecord> = snapshot.ranking().into_iter().take(10).collect();
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "generated_at": snapshot.generated_at,
            "statistics": snapshot.stats(),
            "top": top,
        })),
    )
}

async fn entities(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let entities: Vec<_> = state
        .registry
        .list()
        .iter()
        .map(|a| a.entity().clone())
        .collect();
    Json(json!({ "success": true, "count": entities.len(), "entities": entities }))
}

async fn trigger_scrape(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let previous = match state.store.read_current() {
        Ok(prev) => prev,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    };

    match state
        .orchestrator
        .run(previous.as_ref(), state.run_budget)
        .await
    {
        Ok((_, report)) if report.succeeded() => {
            (StatusCode::OK, Json(json!({ "success": true, "report": report })))
        }
        // Zero usable data: the previous snapshot stays the one served.
        Ok((_, report)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "report": report })),
        ),
        Err(OrchestratorError::RunInProgress) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a scraping run is already in progress" })),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct EventsParams {
    entity: Option<String>,
}

async fn events_sse(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<EventsParams>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();
    let entity = params.entity;

    let stream = BroadcastStream::new(rx).filter_map(move |event| {
        let event = event.ok()?;
        if let Some(id) = &entity {
            if !event_matches_entity(&event, id) {
                return None;
            }
        }
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
