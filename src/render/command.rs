use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::{ArtifactBundle, Component, ComponentLoader, ComponentRegistry, Module};
use crate::builder::executor::Command;

/// Loader that renders every component through an external renderer process
///
/// For each render the configured command is spawned with a JSON request on
/// stdin:
///
/// ```json
/// {"library": "...", "component": "...", "module": {"basename": "...", "source": "..."},
///  "runtime": {"React": {...}}, "props": {...}}
/// ```
///
/// and whatever it prints on stdout is the markup. A non-zero exit fails the
/// render with the process' stderr.
pub struct CommandLoader {
    command_line: String,
    timeout: Duration,
}

impl CommandLoader {
    pub fn new(command_line: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command_line: command_line.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ComponentLoader for CommandLoader {
    async fn load(&self, bundle: ArtifactBundle) -> anyhow::Result<ComponentRegistry> {
        let vars = HashMap::from([
            ("library".to_string(), bundle.library.clone()),
            ("revision".to_string(), bundle.entry.revision.clone()),
        ]);
        let command = Command::parse(&self.command_line, &vars)?;
        let runtime = Arc::new(bundle.runtime);

        let mut registry = ComponentRegistry::new(&bundle.library);
        for (name, module) in bundle.modules {
            let component = ProcessComponent {
                library: bundle.library.clone(),
                name: name.clone(),
                module,
                runtime: Arc::clone(&runtime),
                command: command.clone(),
                timeout: self.timeout,
            };
            registry.insert(name, Arc::new(component));
        }
        Ok(registry)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

struct ProcessComponent {
    library: String,
    name: String,
    module: Module,
    runtime: Arc<BTreeMap<String, Module>>,
    command: Command,
    timeout: Duration,
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    library: &'a str,
    component: &'a str,
    module: &'a Module,
    runtime: &'a BTreeMap<String, Module>,
    props: &'a Value,
}

#[async_trait]
impl Component for ProcessComponent {
    async fn render(&self, input: &Value) -> anyhow::Result<String> {
        let request = serde_json::to_vec(&RenderRequest {
            library: &self.library,
            component: &self.name,
            module: &self.module,
            runtime: &self.runtime,
            props: input,
        })?;

        let result = self
            .command
            .execute_with(Some(&request), Some(self.timeout))
            .await?;
        if !result.success {
            anyhow::bail!(
                "renderer exited with code {}: {}",
                result.exit_code,
                result.stderr.trim()
            );
        }
        Ok(result.stdout.trim_end().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::manifest::{AssetMap, Author, ManifestEntry};
    use serde_json::json;

    fn bundle() -> ArtifactBundle {
        ArtifactBundle {
            library: "widgets".to_string(),
            entry: ManifestEntry::new("abc123", "Add greeting", Author::default()),
            server_stats: AssetMap::default(),
            modules: BTreeMap::from([(
                "Greeting".to_string(),
                Module {
                    basename: "Greeting.abc.js".to_string(),
                    source: "module.exports = 1".to_string(),
                },
            )]),
            runtime: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_renders_through_process_stdin() {
        // `cat` echoes the request back, which proves what the renderer receives.
        let loader = CommandLoader::new("cat", Duration::from_secs(5));
        let registry = loader.load(bundle()).await.unwrap();
        assert_eq!(registry.names(), vec!["Greeting"]);

        let markup = registry
            .get("Greeting")
            .unwrap()
            .render(&json!({"name": "Theia"}))
            .await
            .unwrap();
        let request: Value = serde_json::from_str(&markup).unwrap();

        assert_eq!(request["library"], "widgets");
        assert_eq!(request["component"], "Greeting");
        assert_eq!(request["module"]["basename"], "Greeting.abc.js");
        assert_eq!(request["props"]["name"], "Theia");
    }

    #[tokio::test]
    async fn test_large_module_does_not_stall_renderer() {
        let mut bundle = bundle();
        if let Some(module) = bundle.modules.get_mut("Greeting") {
            module.source = "x".repeat(1024 * 1024);
        }
        let loader = CommandLoader::new("cat", Duration::from_secs(10));
        let registry = loader.load(bundle).await.unwrap();

        let markup = tokio::time::timeout(
            Duration::from_secs(20),
            registry.get("Greeting").unwrap().render(&json!({})),
        )
        .await
        .expect("render should finish within the renderer timeout")
        .unwrap();

        let request: Value = serde_json::from_str(&markup).unwrap();
        assert_eq!(request["module"]["source"].as_str().unwrap().len(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_failing_renderer_is_an_error() {
        let loader = CommandLoader::new("sh -c 'echo broken >&2; exit 1'", Duration::from_secs(5));
        let registry = loader.load(bundle()).await.unwrap();

        let err = registry
            .get("Greeting")
            .unwrap()
            .render(&Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_invalid_command_line_fails_load() {
        let loader = CommandLoader::new("", Duration::from_secs(5));
        assert!(loader.load(bundle()).await.is_err());
    }
}
