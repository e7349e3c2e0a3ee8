//! Artifact store contract
//!
//! Everything a build produces is stored keyed by `(library, basename)`. No
//! other directory semantics are assumed, so backends may be a local
//! directory tree, an object store bucket, or anything else that can honor
//! these four operations.

mod local;

pub use local::LocalStore;

use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// Well-known basename of the per-library build manifest
pub const MANIFEST_BASENAME: &str = "build-manifest.json";

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `contents` under `(library, basename)`, replacing any previous value
    async fn write(&self, library: &str, basename: &str, contents: &str) -> Result<()>;

    /// Whether `(library, basename)` exists
    async fn exists(&self, library: &str, basename: &str) -> Result<bool>;

    /// Load the contents stored under `(library, basename)`
    async fn load(&self, library: &str, basename: &str) -> Result<String>;

    /// Ingest a locally produced file under its own basename
    async fn copy(&self, library: &str, source: &Path) -> Result<()>;

    /// Backend identifier for logging
    fn name(&self) -> &'static str;
}
