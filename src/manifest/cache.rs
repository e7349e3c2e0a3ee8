use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use super::{AssetMap, BuildManifest, LatestStats, ManifestEntry};
use crate::hooks::{channel, HookDispatcher, LibraryEvent};
use crate::render::{ArtifactBundle, ComponentLoader, ComponentRegistry, Module};
use crate::storage::{ArtifactStore, MANIFEST_BASENAME};
use crate::{Result, TheiaError};

/// Cached values of one library, all derived from the same manifest
#[derive(Default)]
struct Slot {
    generation: u64,
    manifest: Option<Arc<BuildManifest>>,
    stats: Option<Arc<LatestStats>>,
    registry: Option<LoadedLibrary>,
}

impl Slot {
    fn clear(&mut self) {
        self.generation += 1;
        self.manifest = None;
        self.stats = None;
        self.registry = None;
    }

    fn is_populated(&self) -> bool {
        self.manifest.is_some() || self.stats.is_some() || self.registry.is_some()
    }
}

/// A component registry together with the asset maps of the build it was
/// loaded from
#[derive(Debug, Clone)]
pub struct LoadedLibrary {
    pub revision: String,
    pub registry: Arc<ComponentRegistry>,
    pub stats: Arc<LatestStats>,
}

#[derive(Default)]
struct Slots {
    epoch: u64,
    libraries: HashMap<String, Slot>,
}

/// Point in the invalidation history a load started from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    epoch: u64,
    generation: u64,
}

/// Per-library caches of the parsed manifest, the latest asset maps and the
/// loaded component registry
///
/// The three caches of a library are always cleared together. A value loaded
/// from a manifest that was invalidated while the load was in flight is
/// returned to its caller but never stored. Concurrent misses for the same
/// library are not coalesced; each caller loads independently.
pub struct ManifestCache {
    store: Arc<dyn ArtifactStore>,
    loader: Arc<dyn ComponentLoader>,
    hooks: HookDispatcher,
    slots: Mutex<Slots>,
}

impl ManifestCache {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        loader: Arc<dyn ComponentLoader>,
        hooks: HookDispatcher,
    ) -> Self {
        Self {
            store,
            loader,
            hooks,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Whether the library has a stored manifest
    pub async fn has_manifest(&self, library: &str) -> Result<bool> {
        if self.cached_manifest(library).is_some() {
            return Ok(true);
        }
        self.store.exists(library, MANIFEST_BASENAME).await
    }

    /// The library's manifest, loaded from the store on a miss
    pub async fn get_manifest(&self, library: &str) -> Result<Arc<BuildManifest>> {
        if let Some(manifest) = self.cached_manifest(library) {
            return Ok(manifest);
        }

        let stamp = self.stamp(library);
        let manifest = Arc::new(
            self.store_manifest(library)
                .await?
                .ok_or_else(|| TheiaError::LibraryNotRegistered(library.to_string()))?,
        );

        self.store_if_current(library, stamp, |slot| {
            slot.manifest = Some(Arc::clone(&manifest));
        });
        Ok(manifest)
    }

    /// Read the manifest straight from the store, bypassing the cache
    pub async fn store_manifest(&self, library: &str) -> Result<Option<BuildManifest>> {
        if !self.store.exists(library, MANIFEST_BASENAME).await? {
            return Ok(None);
        }
        let contents = self.store.load(library, MANIFEST_BASENAME).await?;
        BuildManifest::from_json(&contents).map(Some)
    }

    /// Asset maps of the latest successful build
    pub async fn get_latest_stats(&self, library: &str) -> Result<Arc<LatestStats>> {
        if let Some(stats) = self.with_slot(library, |slot| slot.stats.clone()) {
            return Ok(stats);
        }

        let stamp = self.stamp(library);
        let manifest = self.get_manifest(library).await?;
        let latest = manifest
            .latest_successful()
            .ok_or_else(|| TheiaError::NoSuccessfulBuild(library.to_string()))?;
        let stats = Arc::new(self.load_stats(library, latest).await?);

        self.store_if_current(library, stamp, |slot| {
            slot.stats = Some(Arc::clone(&stats));
        });
        Ok(stats)
    }

    /// The library's component registry, loaded through the component loader on a miss
    pub async fn get_registry(&self, library: &str) -> Result<Arc<ComponentRegistry>> {
        Ok(self.get_loaded(library).await?.registry)
    }

    /// Registry and asset maps taken from the same manifest entry
    pub async fn get_loaded(&self, library: &str) -> Result<LoadedLibrary> {
        if let Some(loaded) = self.with_slot(library, |slot| slot.registry.clone()) {
            return Ok(loaded);
        }

        let stamp = self.stamp(library);
        let manifest = self.get_manifest(library).await?;
        let latest = manifest
            .latest_successful()
            .ok_or_else(|| TheiaError::NoSuccessfulBuild(library.to_string()))?
            .clone();
        let stats = Arc::new(self.load_stats(library, &latest).await?);

        let mut modules = BTreeMap::new();
        for component in stats.server.component_names() {
            let Some(basename) = stats.server.script_for(component) else {
                tracing::warn!(library, component, "server chunk has no script, skipping");
                continue;
            };
            modules.insert(component.to_string(), self.load_module(library, basename).await?);
        }

        let mut runtime = BTreeMap::new();
        for (name, basename) in &latest.artifacts.runtime {
            runtime.insert(name.clone(), self.load_module(library, basename).await?);
        }

        let bundle = ArtifactBundle {
            library: library.to_string(),
            entry: latest.clone(),
            server_stats: stats.server.clone(),
            modules,
            runtime,
        };
        let registry = self
            .loader
            .load(bundle)
            .await
            .map_err(|e| TheiaError::Loader {
                library: library.to_string(),
                message: format!("{e:#}"),
            })?;
        let loaded = LoadedLibrary {
            revision: latest.revision.clone(),
            registry: Arc::new(registry),
            stats,
        };

        self.store_if_current(library, stamp, |slot| {
            slot.stats = Some(Arc::clone(&loaded.stats));
            slot.registry = Some(loaded.clone());
        });
        tracing::debug!(
            library,
            revision = %latest.revision,
            loader = self.loader.name(),
            "loaded component registry"
        );

        self.hooks
            .dispatch_logged::<channel::LibraryLoaded>(LibraryEvent {
                library: library.to_string(),
                entry: latest,
            })
            .await;

        Ok(loaded)
    }

    /// Clear one library's caches, or every library's when `library` is `None`
    pub fn invalidate(&self, library: Option<&str>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match library {
            Some(library) => slots.libraries.entry(library.to_string()).or_default().clear(),
            None => {
                slots.epoch += 1;
                slots.libraries.values_mut().for_each(Slot::clear);
            }
        }
    }

    /// The cached manifest, without touching the store
    pub fn cached_manifest(&self, library: &str) -> Option<Arc<BuildManifest>> {
        self.with_slot(library, |slot| slot.manifest.clone())
    }

    /// Whether the library's registry is cached
    pub fn has_cached_registry(&self, library: &str) -> bool {
        self.with_slot(library, |slot| slot.registry.clone()).is_some()
    }

    /// Whether anything is cached for the library
    pub fn is_cached(&self, library: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.libraries.get(library).is_some_and(Slot::is_populated)
    }

    async fn load_stats(&self, library: &str, entry: &ManifestEntry) -> Result<LatestStats> {
        Ok(LatestStats {
            browser: self.load_asset_map(library, &entry.artifacts.browser_stats).await?,
            server: self.load_asset_map(library, &entry.artifacts.server_stats).await?,
        })
    }

    async fn load_asset_map(&self, library: &str, basename: &str) -> Result<AssetMap> {
        let contents = self.store.load(library, basename).await?;
        AssetMap::from_json(&contents)
    }

    async fn load_module(&self, library: &str, basename: &str) -> Result<Module> {
        Ok(Module {
            basename: basename.to_string(),
            source: self.store.load(library, basename).await?,
        })
    }

    fn with_slot<T>(&self, library: &str, read: impl FnOnce(&Slot) -> Option<T>) -> Option<T> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.libraries.get(library).and_then(read)
    }

    fn stamp(&self, library: &str) -> Stamp {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Stamp {
            epoch: slots.epoch,
            generation: slots.libraries.get(library).map_or(0, |slot| slot.generation),
        }
    }

    fn store_if_current(&self, library: &str, stamp: Stamp, write: impl FnOnce(&mut Slot)) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.epoch != stamp.epoch {
            return false;
        }
        let slot = slots.libraries.entry(library.to_string()).or_default();
        if slot.generation != stamp.generation {
            return false;
        }
        write(slot);
        true
    }
}
