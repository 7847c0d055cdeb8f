//! Builder for [`BatchManager`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::EngineError;
use crate::events::Bus;
use crate::policies::Retry;
use crate::resolver::DataResolver;
use crate::store::Store;

use super::manager::BatchManager;
use super::notify::Notifier;
use super::offset::OffsetCursor;
use super::registry::Registry;

/// Assembles a [`BatchManager`] from its collaborators.
///
/// The store and the resolver are mandatory; everything else has defaults
/// taken from [`Config`].
pub struct BatchManagerBuilder {
    cfg: Config,
    store: Option<Arc<dyn Store>>,
    resolver: Option<Arc<dyn DataResolver>>,
}

impl BatchManagerBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            store: None,
            resolver: None,
        }
    }

    /// Sets the persistence collaborator.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the data-resolution collaborator.
    pub fn with_resolver(mut self, resolver: Arc<dyn DataResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Builds the manager. No background task is spawned until
    /// [`BatchManager::start`].
    pub fn build(self) -> Result<BatchManager, EngineError> {
        let store = self.store.ok_or(EngineError::MissingStore)?;
        let resolver = self.resolver.ok_or(EngineError::MissingResolver)?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let retry = Retry::new(self.cfg.retry);
        let cursor = Arc::new(OffsetCursor::new(store.clone(), retry, bus.clone()));
        let registry = Arc::new(Registry::new(
            store.clone(),
            cursor.clone(),
            bus.clone(),
            retry,
            token.clone(),
        ));
        let (notifier, hints_rx) = Notifier::new(self.cfg.hint_capacity_clamped());

        Ok(BatchManager::assemble(
            self.cfg, bus, store, resolver, registry, cursor, notifier, hints_rx, token, retry,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn build_requires_a_store() {
        let out = BatchManagerBuilder::new(Config::default())
            .with_resolver(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(out, Err(EngineError::MissingStore)));
    }

    #[test]
    fn build_requires_a_resolver() {
        let out = BatchManagerBuilder::new(Config::default())
            .with_store(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(out, Err(EngineError::MissingResolver)));
    }

    #[test]
    fn build_succeeds_with_both_collaborators() {
        let store = Arc::new(MemoryStore::new());
        let out = BatchManagerBuilder::new(Config::default())
            .with_store(store.clone())
            .with_resolver(store)
            .build();
        assert!(out.is_ok());
    }
}
