//! CLI subcommand implementations for the tasa binary.

pub mod list_cmd;
pub mod scrape_cmd;
pub mod serve_cmd;
pub mod show_cmd;

use crate::config::{self, EntityConfig, FetchStrategy};
use crate::events::EventBus;
use crate::orchestrator::Orchestrator;
use crate::registry::AdapterRegistry;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NoopRenderer, Renderer};
use crate::store::SnapshotStore;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Options shared by the data-handling subcommands.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub data_dir: PathBuf,
    pub entities_file: Option<PathBuf>,
}

/// Everything a run or a server needs, wired together.
pub struct Runtime {
    pub store: Arc<SnapshotStore>,
    pub registry: Arc<AdapterRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<EventBus>,
}

/// Resolve the entity table from `--entities` or the built-in defaults.
pub fn resolve_entities(opts: &RuntimeOptions) -> Result<Vec<EntityConfig>> {
    match &opts.entities_file {
        Some(path) => config::load_entities(path),
        None => Ok(config::default_entities()),
    }
}

/// Build the store, registry, and orchestrator.
///
/// Launches a headless browser only when some entity needs a rendered
/// fetch; if the launch fails those entities degrade to per-run failures
/// while direct and derived sources keep working.
pub async fn build_runtime(opts: &RuntimeOptions) -> Result<Runtime> {
    let entities = resolve_entities(opts)?;

    let needs_browser = entities
        .iter()
        .any(|e| e.fetch_strategy == FetchStrategy::Rendered);
    let renderer: Arc<dyn Renderer> = if needs_browser {
        match ChromiumRenderer::new().await {
            Ok(r) => Arc::new(r),
            Err(e) => {
                warn!("browser unavailable, rendered sources will fail this session: {e:#}");
                Arc::new(NoopRenderer)
            }
        }
    } else {
        Arc::new(NoopRenderer)
    };

    let store = Arc::new(
        SnapshotStore::open(&opts.data_dir)
            .with_context(|| format!("opening data dir {}", opts.data_dir.display()))?,
    );
    let registry = Arc::new(AdapterRegistry::build(entities, renderer)?);
    let bus = Arc::new(EventBus::new(64));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::clone(&bus),
    ));

    Ok(Runtime {
        store,
        registry,
        orchestrator,
        bus,
    })
}
