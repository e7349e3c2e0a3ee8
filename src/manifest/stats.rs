use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;

/// Parsed build-tool stats: which output files belong to which component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMap {
    #[serde(default, deserialize_with = "one_or_many")]
    pub assets_by_chunk_name: BTreeMap<String, Vec<String>>,

    /// Errors the build tool reported inside its structured output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

impl AssetMap {
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Files emitted for `component`
    pub fn assets_for(&self, component: &str) -> Option<&[String]> {
        self.assets_by_chunk_name.get(component).map(Vec::as_slice)
    }

    /// The first JavaScript file of `component`
    pub fn script_for(&self, component: &str) -> Option<&str> {
        self.assets_for(component)?
            .iter()
            .find(|asset| asset.ends_with(".js"))
            .map(String::as_str)
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.assets_by_chunk_name.keys().map(String::as_str)
    }

    /// Reported errors as plain messages
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|error| match error {
                Value::String(message) => message.clone(),
                Value::Object(fields) => fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Asset maps of the latest successful build, one per execution context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestStats {
    pub browser: AssetMap,
    pub server: AssetMap,
}

// Build tools emit a bare string for single-file chunks.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(chunk, assets)| {
            let assets = match assets {
                OneOrMany::One(asset) => vec![asset],
                OneOrMany::Many(assets) => assets,
            };
            (chunk, assets)
        })
        .collect())
}
