//! The core: owns configuration, caches and hooks, and exposes build and
//! render operations to hosts and plugins.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::builder::{
    BuildQueue, BuildReport, Builder, DefaultBuilder, GitSource, SweepSummary, YarnWebpack,
};
use crate::config::{CoreConfig, TheiaPaths};
use crate::hooks::{channel, HookDispatcher, HostEvent, LibraryEvent, RenderEvent, StartEvent};
use crate::host::RouteTable;
use crate::manifest::{BuildManifest, ManifestCache, ManifestEntry};
use crate::plugins::{self, Plugin};
use crate::render::{CommandLoader, ComponentLoader, RenderAssets, RenderResult};
use crate::storage::{ArtifactStore, LocalStore, MANIFEST_BASENAME};
use crate::{Result, TheiaError};

/// Collaborators the core is wired with
pub struct CoreParts {
    pub store: Arc<dyn ArtifactStore>,
    pub loader: Arc<dyn ComponentLoader>,
    pub builder: Arc<dyn Builder>,
}

pub struct Core {
    config: CoreConfig,
    store: Arc<dyn ArtifactStore>,
    hooks: HookDispatcher,
    cache: ManifestCache,
    builder: Arc<dyn Builder>,
    queue: BuildQueue,
}

impl Core {
    /// Wire a core and apply `plugins` to it
    pub fn new(config: CoreConfig, parts: CoreParts, plugins: Vec<Box<dyn Plugin>>) -> Arc<Core> {
        let hooks = HookDispatcher::new();
        let core = Arc::new_cyclic(|weak| Core {
            cache: ManifestCache::new(Arc::clone(&parts.store), parts.loader, hooks.clone()),
            queue: BuildQueue::new(weak.clone()),
            store: parts.store,
            builder: parts.builder,
            hooks,
            config,
        });

        for plugin in plugins {
            debug!(plugin = plugin.name(), "applying plugin");
            plugin.apply(&core);
        }
        core
    }

    /// Wire the bundled collaborators and plugins from configuration
    pub fn from_config(config: CoreConfig) -> Result<Arc<Core>> {
        let defaults = TheiaPaths::default();
        let storage_dir = config
            .storage_dir
            .clone()
            .unwrap_or_else(|| defaults.storage_dir.clone());
        let git_dir = config.git_dir.clone().unwrap_or(defaults.git_dir);

        let store = Arc::new(LocalStore::new(storage_dir));
        let builder = Arc::new(DefaultBuilder::new(
            Arc::new(GitSource::default()),
            Arc::new(YarnWebpack::new(config.toolchain.clone())),
            git_dir,
        ));
        let loader = Arc::new(CommandLoader::new(
            config.renderer.command.clone(),
            Duration::from_millis(config.renderer.timeout_ms),
        ));
        let plugins = plugins::from_settings(&config.plugins);

        info!(
            environment = config.environment(),
            libraries = config.libs.len(),
            store = store.name(),
            "core configured"
        );
        Ok(Core::new(
            config,
            CoreParts {
                store,
                loader,
                builder,
            },
            plugins,
        ))
    }

    /// Announce process start to plugins
    pub async fn start(&self) {
        self.hooks.dispatch_logged::<channel::Start>(StartEvent).await;
    }

    /// Hand `routes` to plugins so they can register endpoints
    pub async fn integrate_host(&self, routes: RouteTable) {
        self.hooks
            .dispatch_logged::<channel::Host>(HostEvent { routes })
            .await;
    }

    /// Render `component` of `library` with `input`
    ///
    /// Listener failures on either render channel never fail the render.
    pub async fn render(&self, library: &str, component: &str, input: Value) -> Result<RenderResult> {
        let event = RenderEvent {
            library: library.to_string(),
            component: component.to_string(),
            input,
        };
        self.hooks
            .dispatch_detached::<channel::BeforeRender>(event.clone());

        // Markup and assets come from the same build.
        let loaded = self.cache.get_loaded(library).await?;
        let instance = loaded
            .registry
            .get(component)
            .ok_or_else(|| TheiaError::ComponentNotRegistered {
                library: library.to_string(),
                component: component.to_string(),
            })?;

        let markup = instance
            .render(&event.input)
            .await
            .map_err(|e| TheiaError::Render {
                library: library.to_string(),
                component: component.to_string(),
                message: format!("{e:#}"),
            })?;

        let assets = loaded
            .stats
            .browser
            .assets_for(component)
            .map(RenderAssets::from_files)
            .unwrap_or_default();

        self.hooks.dispatch_detached::<channel::Render>(event);
        Ok(RenderResult { markup, assets })
    }

    /// Build one library through the build queue
    pub async fn build(&self, library: &str) -> Result<BuildReport> {
        self.queue.build(library).await
    }

    /// Build every configured library through the build queue
    pub async fn build_all(&self) -> Result<SweepSummary> {
        self.queue.build_all().await
    }

    /// Run a build directly; only the queue worker calls this
    pub(crate) async fn run_build(&self, library: &str) -> Result<BuildReport> {
        let config = self.config.library(library).ok_or_else(|| {
            TheiaError::Config(format!("Library '{library}' is not configured"))
        })?;
        self.builder.build(self, library, config).await
    }

    /// Store `assets` and append `entry` to the library's manifest
    ///
    /// The manifest is re-read from the store, never from the cache, so an
    /// append always extends what is persisted.
    pub async fn register_library(
        &self,
        library: &str,
        assets: &[PathBuf],
        entry: ManifestEntry,
    ) -> Result<ManifestEntry> {
        for asset in assets {
            self.store.copy(library, asset).await?;
        }

        let mut manifest = self
            .cache
            .store_manifest(library)
            .await?
            .unwrap_or_else(BuildManifest::new);
        manifest.push(entry.clone());
        self.store
            .write(library, MANIFEST_BASENAME, &manifest.to_json()?)
            .await?;
        self.cache.invalidate(Some(library));

        info!(
            library,
            revision = %entry.revision,
            success = entry.success,
            entries = manifest.len(),
            "manifest updated"
        );
        self.hooks
            .dispatch_detached::<channel::LibraryUpdated>(LibraryEvent {
                library: library.to_string(),
                entry: entry.clone(),
            });
        Ok(entry)
    }

    /// Clear one library's caches, or all of them
    pub fn invalidate(&self, library: Option<&str>) {
        self.cache.invalidate(library);
    }

    /// Log an error and publish it on the error channel
    pub fn report_error(&self, namespace: &str, message: impl fmt::Display) {
        self.hooks.report_error(namespace, message);
    }

    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Active environment
    pub fn environment(&self) -> &str {
        self.config.environment()
    }
}
