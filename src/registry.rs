//! Adapter registry — the static table of entities a run drives.
//!
//! Built once at process start from configuration. Iteration order is
//! registration order, so two runs over the same configuration dispatch,
//! merge, and report in the same sequence — history files stay diffable.

use crate::adapter::derived::DerivedAdapter;
use crate::adapter::direct::DirectFetchAdapter;
use crate::adapter::rendered::RenderedFetchAdapter;
use crate::adapter::SourceAdapter;
use crate::config::{EntityConfig, FetchStrategy};
use crate::renderer::Renderer;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Registry construction errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate entity_id {0:?}")]
    DuplicateEntity(String),
    #[error("invalid configuration for {entity_id:?}: {source}")]
    InvalidEntity {
        entity_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Read-only, ordered table of adapters.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Build adapters for every configured entity.
    ///
    /// Rendered entities share the given browser engine; everything else
    /// owns its own fetch client.
    pub fn build(
        entities: Vec<EntityConfig>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, RegistryError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(entities.len());

        for entity in entities {
            if !seen.insert(entity.entity_id.clone()) {
                return Err(RegistryError::DuplicateEntity(entity.entity_id));
            }
            entity
                .validate()
                .map_err(|source| RegistryError::InvalidEntity {
                    entity_id: entity.entity_id.clone(),
                    source,
                })?;

            let adapter: Arc<dyn SourceAdapter> = match entity.fetch_strategy {
                FetchStrategy::Direct => Arc::new(DirectFetchAdapter::new(entity)),
                FetchStrategy::Rendered => {
                    Arc::new(RenderedFetchAdapter::new(entity, Arc::clone(&renderer)))
                }
                FetchStrategy::Derived => Arc::new(DerivedAdapter::new(entity)),
            };
            adapters.push(adapter);
        }

        Ok(Self { adapters })
    }

    /// Wrap pre-built adapters, preserving their order.
    ///
    /// Used when adapter construction is handled elsewhere (injected
    /// doubles in tests, custom sources in embedders).
    pub fn with_adapters(
        adapters: Vec<Arc<dyn SourceAdapter>>,
    ) -> Result<Self, RegistryError> {
        let mut seen: HashSet<String> = HashSet::new();
        for adapter in &adapters {
            let id = &adapter.entity().entity_id;
            if !seen.insert(id.clone()) {
                return Err(RegistryError::DuplicateEntity(id.clone()));
            }
        }
        Ok(Self { adapters })
    }

    /// Adapters in registration order.
    pub fn list(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Look up one adapter by entity id.
    pub fn get(&self, entity_id: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.entity().entity_id == entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_entities;
    use crate::renderer::NoopRenderer;

    #[test]
    fn test_build_preserves_registration_order() {
        let entities = default_entities();
        let expected: Vec<String> = entities.iter().map(|e| e.entity_id.clone()).collect();

        let registry = AdapterRegistry::build(entities, Arc::new(NoopRenderer)).unwrap();
        let actual: Vec<String> = registry
            .list()
            .iter()
            .map(|a| a.entity().entity_id.clone())
            .collect();

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let mut entities = default_entities();
        let dup = entities[0].clone();
        entities.push(dup);

        match AdapterRegistry::build(entities, Arc::new(NoopRenderer)) {
            Err(RegistryError::DuplicateEntity(id)) => assert_eq!(id, "bancolombia"),
            other => panic!("expected duplicate error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_get_by_entity_id() {
        let registry =
            AdapterRegistry::build(default_entities(), Arc::new(NoopRenderer)).unwrap();
        assert!(registry.get("nubank").is_some());
        assert!(registry.get("unknown").is_none());
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), default_entities().len());
    }
}
