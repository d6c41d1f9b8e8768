//! The refresh engine as seen by upstream callers.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cache::ImageCache;
use crate::catalog::{Catalog, CatalogEntry, RescanReport};
use crate::config::{self, CacheSettings, ConfigStore};
use crate::display::DisplaySink;
use crate::error::{CatalogError, DisplayError};
use crate::events::{DisplayOutcome, ScheduleState};
use crate::scheduler::Scheduler;

/// Owns the cache, catalog and scheduler for one display.
pub struct Engine {
    config: Arc<dyn ConfigStore>,
    cache: Arc<ImageCache>,
    scheduler: Scheduler,
}

impl Engine {
    /// Build every component from configuration. The scheduler is left
    /// stopped.
    pub fn from_config(
        config: Arc<dyn ConfigStore>,
        sink: Box<dyn DisplaySink>,
    ) -> Result<Self, CatalogError> {
        let settings = CacheSettings::load(&*config);
        let cache = Arc::new(ImageCache::from_settings(&settings));
        Self::with_cache(config, cache, sink)
    }

    /// Like [`Engine::from_config`] but with a caller-provided cache.
    pub fn with_cache(
        config: Arc<dyn ConfigStore>,
        cache: Arc<ImageCache>,
        sink: Box<dyn DisplaySink>,
    ) -> Result<Self, CatalogError> {
        info!(
            capacity = cache.capacity(),
            ttl = %humantime::format_duration(cache.ttl()),
            "image cache ready"
        );
        let folder = config::image_folder(&*config);
        let catalog = Arc::new(Catalog::open(folder, Arc::clone(&cache), Arc::clone(&config))?);
        let scheduler = Scheduler::new(catalog, Arc::clone(&config), sink);
        Ok(Self {
            config,
            cache,
            scheduler,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.scheduler.catalog()
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    pub fn rescan(&self) -> RescanReport {
        self.catalog().rescan()
    }

    pub fn add(&self, source: &Path, name: &str) -> Result<CatalogEntry, CatalogError> {
        self.catalog().add(source, name)
    }

    pub fn remove(&self, name: &str) -> Result<(), CatalogError> {
        self.catalog().remove(name)
    }

    pub fn remove_all(&self) -> Result<usize, CatalogError> {
        self.catalog().remove_all()
    }

    pub fn set_current(&self, name: &str) -> bool {
        self.catalog().set_current(name)
    }

    pub fn refresh_only(&self) -> Result<DisplayOutcome, DisplayError> {
        self.scheduler.refresh_only()
    }

    pub fn show_next(&self) -> Result<DisplayOutcome, DisplayError> {
        self.scheduler.show_next()
    }

    pub fn show_previous(&self) -> Result<DisplayOutcome, DisplayError> {
        self.scheduler.show_previous()
    }

    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await
    }

    pub fn trigger(&self) {
        self.scheduler.trigger()
    }

    pub fn state(&self) -> ScheduleState {
        self.scheduler.state()
    }
}
