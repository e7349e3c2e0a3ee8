//! Plugins extend the core through its hook channels
//!
//! A plugin is applied once, right after the core is constructed. Listeners
//! it registers must hold the core weakly so the core can still be dropped.

mod rebuild;
mod reconcile;

pub use rebuild::RebuildPlugin;
pub use reconcile::{reconcile_once, ReconcilePlugin};

use std::sync::Arc;
use std::time::Duration;

use crate::config::PluginSettings;
use crate::core::Core;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register listeners on `core`
    fn apply(&self, core: &Arc<Core>);
}

/// Bundled plugins enabled by configuration
pub fn from_settings(settings: &PluginSettings) -> Vec<Box<dyn Plugin>> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();
    if let Some(secs) = settings.reconcile_interval_secs {
        plugins.push(Box::new(ReconcilePlugin::new(Duration::from_secs(secs))));
    }
    if let Some(secs) = settings.rebuild_interval_secs {
        plugins.push(Box::new(RebuildPlugin::new(Duration::from_secs(secs))));
    }
    plugins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugins_follow_settings() {
        assert!(from_settings(&PluginSettings::default()).is_empty());

        let plugins = from_settings(&PluginSettings {
            rebuild_interval_secs: Some(600),
            reconcile_interval_secs: Some(30),
        });
        let names: Vec<_> = plugins.iter().map(|plugin| plugin.name()).collect();
        assert_eq!(names, vec!["reconcile", "rebuild"]);
    }
}
