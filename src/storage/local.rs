use super::ArtifactStore;
use crate::{Result, TheiaError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Filesystem store laid out as `<root>/<library>/<basename>`
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `(library, basename)`; both must be single path components
    fn path_for(&self, library: &str, basename: &str) -> Result<PathBuf> {
        for component in [library, basename] {
            if !is_plain_name(component) {
                return Err(TheiaError::storage(
                    library,
                    basename,
                    format!("'{component}' is not a plain file name"),
                ));
            }
        }
        Ok(self.root.join(library).join(basename))
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn write(&self, library: &str, basename: &str, contents: &str) -> Result<()> {
        let path = self.path_for(library, basename)?;
        fs::create_dir_all(self.root.join(library))
            .await
            .map_err(|e| TheiaError::storage(library, basename, e))?;
        fs::write(&path, contents)
            .await
            .map_err(|e| TheiaError::storage(library, basename, e))
    }

    async fn exists(&self, library: &str, basename: &str) -> Result<bool> {
        fs::try_exists(self.path_for(library, basename)?)
            .await
            .map_err(|e| TheiaError::storage(library, basename, e))
    }

    async fn load(&self, library: &str, basename: &str) -> Result<String> {
        fs::read_to_string(self.path_for(library, basename)?)
            .await
            .map_err(|e| TheiaError::storage(library, basename, e))
    }

    async fn copy(&self, library: &str, source: &Path) -> Result<()> {
        let basename = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                TheiaError::storage(library, &source.display().to_string(), "source has no basename")
            })?;

        let target = self.path_for(library, basename)?;
        fs::create_dir_all(self.root.join(library))
            .await
            .map_err(|e| TheiaError::storage(library, basename, e))?;
        fs::copy(source, target)
            .await
            .map_err(|e| TheiaError::storage(library, basename, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
