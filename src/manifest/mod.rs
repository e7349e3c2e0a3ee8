//! Build manifests, build-tool asset maps and the per-library cache over both

mod cache;
mod stats;
mod types;

pub use cache::{LoadedLibrary, ManifestCache};
pub use stats::{AssetMap, LatestStats};
pub use types::{Artifacts, Author, BuildManifest, ManifestEntry};
