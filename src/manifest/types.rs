use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// Author of the built revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Basenames of the artifacts one build stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    /// Asset map of the server-executable bundle
    pub server_stats: String,
    /// Asset map of the browser bundle
    pub browser_stats: String,
    /// Shared runtime bundles by logical name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub runtime: BTreeMap<String, String>,
}

/// One recorded build attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Source revision, the natural key of an entry
    pub revision: String,
    pub revision_summary: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub success: bool,
    pub artifacts: Artifacts,
}

impl ManifestEntry {
    /// Start an entry for `revision`; it stays unsuccessful until the build completes
    pub fn new(revision: impl Into<String>, revision_summary: impl Into<String>, author: Author) -> Self {
        Self {
            revision: revision.into(),
            revision_summary: revision_summary.into(),
            author,
            created_at: Utc::now(),
            success: false,
            artifacts: Artifacts::default(),
        }
    }
}

/// Append-only build history of one library, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildManifest {
    entries: Vec<ManifestEntry>,
}

impl BuildManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// The full document, rewritten on every append
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry, successful or not
    pub fn latest(&self) -> Option<&ManifestEntry> {
        self.entries.last()
    }

    /// Most recent entry whose build succeeded
    pub fn latest_successful(&self) -> Option<&ManifestEntry> {
        self.entries.iter().rev().find(|entry| entry.success)
    }

    /// Whether two manifests agree on length and latest revision
    pub fn same_tail(&self, other: &BuildManifest) -> bool {
        if self.len() != other.len() {
            return false;
        }
        match (self.latest(), other.latest()) {
            (Some(a), Some(b)) => a.revision == b.revision,
            _ => true,
        }
    }
}
