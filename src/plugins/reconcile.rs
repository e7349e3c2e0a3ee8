use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

use super::Plugin;
use crate::core::Core;
use crate::hooks::channel;
use crate::manifest::BuildManifest;
use crate::TheiaError;

const NAMESPACE: &str = "theia:reconcile";

/// Refresh caches of libraries whose stored manifest moved on
///
/// Only libraries with a cached manifest are compared; the comparison is the
/// manifest length plus the latest revision. A refreshed library's registry is
/// loaded again right away. Returns the refreshed library names.
pub async fn reconcile_once(core: &Core) -> Vec<String> {
    let mut refreshed = Vec::new();
    for library in core.config().library_names() {
        let Some(cached) = core.cache().cached_manifest(&library) else {
            continue;
        };
        let stored = match core.cache().store_manifest(&library).await {
            Ok(stored) => stored.unwrap_or_else(BuildManifest::new),
            Err(err) => {
                core.report_error(NAMESPACE, &err);
                continue;
            }
        };
        if cached.same_tail(&stored) {
            continue;
        }

        info!(
            library = %library,
            cached = cached.len(),
            stored = stored.len(),
            "stored manifest changed, refreshing"
        );
        core.invalidate(Some(&library));
        match core.cache().get_registry(&library).await {
            Ok(_) => {}
            Err(err @ (TheiaError::LibraryNotRegistered(_) | TheiaError::NoSuccessfulBuild(_))) => {
                debug!(library = %library, "nothing to warm: {err}");
            }
            Err(err) => core.report_error(NAMESPACE, &err),
        }
        refreshed.push(library);
    }
    refreshed
}

/// Periodically reconciles caches with a store shared by several processes
pub struct ReconcilePlugin {
    interval: Duration,
}

impl ReconcilePlugin {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Plugin for ReconcilePlugin {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    fn apply(&self, core: &Arc<Core>) {
        let weak = Arc::downgrade(core);
        let interval = self.interval;
        let started = Arc::new(AtomicBool::new(false));

        core.hooks()
            .on::<channel::Start>()
            .register(self.name(), move |_| {
                if !started.swap(true, Ordering::SeqCst) {
                    tokio::spawn(poll(weak.clone(), interval));
                }
                async { Ok(()) }
            });
    }
}

async fn poll(core: Weak<Core>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(core) = core.upgrade() else {
            break;
        };
        let refreshed = reconcile_once(&core).await;
        if !refreshed.is_empty() {
            debug!(?refreshed, "reconciled");
        }
    }
}
