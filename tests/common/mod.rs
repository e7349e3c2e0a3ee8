//! Shared fixtures: in-memory store, scripted source control and toolchain,
//! and a loader whose components fill `{{prop}}` placeholders from the input.

#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use theia::builder::{BuildContext, DefaultBuilder, RevisionInfo, SourceControl, Toolchain};
use theia::config::{CoreConfig, LibraryConfig};
use theia::manifest::{Author, BuildManifest};
use theia::render::{ArtifactBundle, Component, ComponentLoader, ComponentRegistry};
use theia::storage::{ArtifactStore, MANIFEST_BASENAME};
use theia::{Core, CoreParts, Result, TheiaError};

pub const GREETING_TEMPLATE: &str = "<div>Hello <em>{{name}}</em>!!!</div>";

pub fn greeting_input() -> Value {
    json!({"name": "Theia"})
}

pub fn source_for(library: &str) -> String {
    format!("file:///repos/{library}")
}

/// Artifact store kept in memory, counting reads per library
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<(String, String), String>>,
    reads: Mutex<HashMap<String, usize>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Make every write fail, as a full disk or a revoked credential would
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn reads(&self, library: &str) -> usize {
        self.reads.lock().unwrap().get(library).copied().unwrap_or(0)
    }

    pub fn contents(&self, library: &str, basename: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(&(library.to_string(), basename.to_string()))
            .cloned()
    }

    pub fn manifest(&self, library: &str) -> Option<BuildManifest> {
        self.contents(library, MANIFEST_BASENAME)
            .map(|json| BuildManifest::from_json(&json).unwrap())
    }

    fn count_read(&self, library: &str) {
        *self.reads.lock().unwrap().entry(library.to_string()).or_default() += 1;
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn write(&self, library: &str, basename: &str, contents: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(TheiaError::Storage {
                library: library.to_string(),
                basename: basename.to_string(),
                message: "read-only store".to_string(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .insert((library.to_string(), basename.to_string()), contents.to_string());
        Ok(())
    }

    async fn exists(&self, library: &str, basename: &str) -> Result<bool> {
        self.count_read(library);
        Ok(self.contents(library, basename).is_some())
    }

    async fn load(&self, library: &str, basename: &str) -> Result<String> {
        self.count_read(library);
        self.contents(library, basename).ok_or_else(|| TheiaError::Storage {
            library: library.to_string(),
            basename: basename.to_string(),
            message: "not found".to_string(),
        })
    }

    async fn copy(&self, library: &str, source: &Path) -> Result<()> {
        let basename = source.file_name().unwrap().to_string_lossy().into_owned();
        let contents = tokio::fs::read_to_string(source).await?;
        self.write(library, &basename, &contents).await
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Source control whose head revision is set by the test
pub struct FakeSource {
    head: Mutex<String>,
    failing: Mutex<HashSet<String>>,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            head: Mutex::new("abc123".to_string()),
            failing: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeSource {
    pub fn set_head(&self, revision: &str) {
        *self.head.lock().unwrap() = revision.to_string();
    }

    /// Make syncing `library` fail
    pub fn fail_library(&self, library: &str) {
        self.failing.lock().unwrap().insert(source_for(library));
    }
}

#[async_trait]
impl SourceControl for FakeSource {
    async fn sync(&self, _working_dir: &Path, source: &str, _selector: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(source) {
            bail!("fatal: repository '{source}' not found");
        }
        Ok(())
    }

    async fn head(&self, _working_dir: &Path) -> anyhow::Result<String> {
        Ok(self.head.lock().unwrap().clone())
    }

    async fn describe(&self, _working_dir: &Path, revision: &str) -> anyhow::Result<RevisionInfo> {
        Ok(RevisionInfo {
            summary: format!("Release {revision}"),
            author: Author {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    Ok,
    /// The browser build exits non-zero with errors in its stats
    ExitWithStatsErrors,
    /// The server build succeeds without writing stats
    MissingServerStats,
    /// The server build exits zero but reports errors in its stats
    StatsErrorsOnSuccess,
}

/// Toolchain that writes one module per component into a temporary output dir
pub struct FakeToolchain {
    out: TempDir,
    components: Mutex<Vec<(String, String)>>,
    mode: Mutex<ToolMode>,
    runtime: Mutex<bool>,
    unversioned: Mutex<bool>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self {
            out: TempDir::new().unwrap(),
            components: Mutex::new(vec![("Greeting".to_string(), GREETING_TEMPLATE.to_string())]),
            mode: Mutex::new(ToolMode::Ok),
            runtime: Mutex::new(false),
            unversioned: Mutex::new(false),
        }
    }
}

impl FakeToolchain {
    pub fn set_mode(&self, mode: ToolMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_runtime(&self, enabled: bool) {
        *self.runtime.lock().unwrap() = enabled;
    }

    /// Name outputs without the revision, so every build writes the same files
    pub fn set_unversioned(&self, unversioned: bool) {
        *self.unversioned.lock().unwrap() = unversioned;
    }

    pub fn add_component(&self, name: &str, template: &str) {
        self.components
            .lock()
            .unwrap()
            .push((name.to_string(), template.to_string()));
    }

    fn dir(&self) -> PathBuf {
        self.out.path().join("dist")
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn install(&self, _working_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    async fn has_test(&self, _working_dir: &Path) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn test(&self, _working_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clean(&self, _working_dir: &Path) -> anyhow::Result<()> {
        let dir = self.dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(())
    }

    async fn build(&self, _working_dir: &Path, context: BuildContext, revision: &str) -> anyhow::Result<()> {
        let dir = self.dir();
        let components = self.components.lock().unwrap().clone();
        let mode = *self.mode.lock().unwrap();
        let unversioned = *self.unversioned.lock().unwrap();
        let stem = |name: &str| {
            if unversioned {
                name.to_string()
            } else {
                format!("{name}.{revision}")
            }
        };

        let mut chunks = serde_json::Map::new();
        for (name, template) in components {
            let files = match context {
                BuildContext::Browser => {
                    let script = format!("{}.js", stem(&name));
                    let style = format!("{}.css", stem(&name));
                    let map = format!("{script}.map");
                    std::fs::write(dir.join(&script), "/* hydrate */")?;
                    std::fs::write(dir.join(&style), "em { color: teal; }")?;
                    std::fs::write(dir.join(&map), "{}")?;
                    vec![script, style, map]
                }
                BuildContext::Server => {
                    let module = format!("{}.server.js", stem(&name));
                    let source = if unversioned {
                        format!("{template}<!-- {revision} -->")
                    } else {
                        template
                    };
                    std::fs::write(dir.join(&module), source)?;
                    vec![module]
                }
            };
            chunks.insert(name, json!(files));
        }

        let stats_path = dir.join(context.stats_basename());
        match (mode, context) {
            (ToolMode::ExitWithStatsErrors, BuildContext::Browser) => {
                let stats = json!({"errors": ["Module not found: ./Missing", "Unexpected token (3:4)"]});
                std::fs::write(&stats_path, stats.to_string())?;
                bail!("webpack exited with code 2");
            }
            (ToolMode::MissingServerStats, BuildContext::Server) => {}
            (ToolMode::StatsErrorsOnSuccess, BuildContext::Server) => {
                let stats = json!({"assetsByChunkName": chunks, "errors": [{"message": "Unexpected token"}]});
                std::fs::write(&stats_path, stats.to_string())?;
            }
            _ => {
                let stats = json!({"assetsByChunkName": chunks});
                std::fs::write(&stats_path, stats.to_string())?;
            }
        }
        Ok(())
    }

    async fn build_runtime(&self, _working_dir: &Path, revision: &str) -> anyhow::Result<bool> {
        if !*self.runtime.lock().unwrap() {
            return Ok(false);
        }
        let dir = self.dir();
        std::fs::write(dir.join(format!("React.{revision}.js")), "module.exports = React")?;
        std::fs::write(dir.join("stats-runtime.json"), "{}")?;
        Ok(true)
    }

    fn output_dir(&self, _working_dir: &Path) -> PathBuf {
        self.dir()
    }

    fn runtime_artifacts(&self) -> Vec<String> {
        if *self.runtime.lock().unwrap() {
            vec!["React".to_string()]
        } else {
            Vec::new()
        }
    }
}

/// Loader whose components substitute `{{prop}}` placeholders from the input
#[derive(Default)]
pub struct TemplateLoader {
    loads: AtomicUsize,
}

impl TemplateLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComponentLoader for TemplateLoader {
    async fn load(&self, bundle: ArtifactBundle) -> anyhow::Result<ComponentRegistry> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut registry = ComponentRegistry::new(&bundle.library);
        for (name, module) in bundle.modules {
            registry.insert(
                name,
                Arc::new(TemplateComponent {
                    template: module.source,
                }),
            );
        }
        Ok(registry)
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

struct TemplateComponent {
    template: String,
}

#[async_trait]
impl Component for TemplateComponent {
    async fn render(&self, input: &Value) -> anyhow::Result<String> {
        let mut markup = self.template.clone();
        if let Some(props) = input.as_object() {
            for (key, value) in props {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                markup = markup.replace(&format!("{{{{{key}}}}}"), &value);
            }
        }
        if markup.contains("{{") {
            bail!("missing prop for template {}", self.template);
        }
        Ok(markup)
    }
}

pub fn config_for(libraries: &[&str]) -> CoreConfig {
    let mut config = CoreConfig {
        environment: Some("development".to_string()),
        ..CoreConfig::default()
    };
    for library in libraries {
        config.libs.insert(
            library.to_string(),
            LibraryConfig::new(source_for(library)).with_selector("development", "dev"),
        );
    }
    config
}

/// A core wired with the fakes above
pub struct TestBed {
    pub core: Arc<Core>,
    pub store: Arc<MemoryStore>,
    pub source: Arc<FakeSource>,
    pub toolchain: Arc<FakeToolchain>,
    pub loader: Arc<TemplateLoader>,
    _git_dir: TempDir,
}

impl TestBed {
    pub fn new() -> Self {
        Self::with_libraries(&["widgets"])
    }

    pub fn with_libraries(libraries: &[&str]) -> Self {
        Self::assemble(libraries, Arc::new(MemoryStore::default()), None)
    }

    /// Another core over the same store, as a second process would be
    pub fn sharing_store(libraries: &[&str], store: Arc<MemoryStore>) -> Self {
        Self::assemble(libraries, store, None)
    }

    pub fn with_loader(libraries: &[&str], loader: Arc<dyn ComponentLoader>) -> Self {
        Self::assemble(libraries, Arc::new(MemoryStore::default()), Some(loader))
    }

    fn assemble(
        libraries: &[&str],
        store: Arc<MemoryStore>,
        loader: Option<Arc<dyn ComponentLoader>>,
    ) -> Self {
        let git_dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());
        let toolchain = Arc::new(FakeToolchain::default());
        let template_loader = Arc::new(TemplateLoader::default());

        let builder = DefaultBuilder::new(source.clone(), toolchain.clone(), git_dir.path());
        let core = Core::new(
            config_for(libraries),
            CoreParts {
                store: store.clone(),
                loader: loader.unwrap_or_else(|| template_loader.clone() as Arc<dyn ComponentLoader>),
                builder: Arc::new(builder),
            },
            Vec::new(),
        );

        Self {
            core,
            store,
            source,
            toolchain,
            loader: template_loader,
            _git_dir: git_dir,
        }
    }
}
