//! Component loading boundary and render results
//!
//! The core never executes built artifacts itself. A [`ComponentLoader`]
//! receives the source of every server module of a build and hands back a
//! [`ComponentRegistry`]; how it evaluates that source (an embedded engine, a
//! sidecar process, a sandbox) is its own business.

mod command;

pub use command::CommandLoader;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::manifest::{AssetMap, ManifestEntry};

/// A renderable component instantiated from a built library
#[async_trait]
pub trait Component: Send + Sync {
    /// Render markup for `input`
    async fn render(&self, input: &Value) -> anyhow::Result<String>;
}

/// Components of one library build, by name
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    library: String,
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            components: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, component: Arc<dyn Component>) {
        self.components.insert(name.into(), component);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Component names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("library", &self.library)
            .field("components", &self.names())
            .finish()
    }
}

/// Source text of one stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub basename: String,
    pub source: String,
}

/// Everything a loader needs to instantiate one build
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub library: String,
    pub entry: ManifestEntry,
    pub server_stats: AssetMap,
    /// Server module of each component
    pub modules: BTreeMap<String, Module>,
    /// Shared runtime bundles by logical name
    pub runtime: BTreeMap<String, Module>,
}

#[async_trait]
pub trait ComponentLoader: Send + Sync {
    async fn load(&self, bundle: ArtifactBundle) -> anyhow::Result<ComponentRegistry>;

    /// Loader identifier for logging
    fn name(&self) -> &'static str;
}

/// Browser assets needed to hydrate a rendered component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderAssets {
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
}

impl RenderAssets {
    /// Partition emitted files into scripts and stylesheets, dropping everything else
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a String>) -> Self {
        let mut assets = Self::default();
        for file in files {
            if file.ends_with(".js") {
                assets.scripts.push(file.clone());
            } else if file.ends_with(".css") {
                assets.stylesheets.push(file.clone());
            }
        }
        assets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderResult {
    pub markup: String,
    pub assets: RenderAssets,
}
