use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};

use super::Plugin;
use crate::core::Core;
use crate::hooks::channel;

const NAMESPACE: &str = "theia:rebuild";

/// Sweeps every library through the build queue, then waits `interval`
pub struct RebuildPlugin {
    interval: Duration,
}

impl RebuildPlugin {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Plugin for RebuildPlugin {
    fn name(&self) -> &'static str {
        "rebuild"
    }

    fn apply(&self, core: &Arc<Core>) {
        let weak = Arc::downgrade(core);
        let interval = self.interval;
        let started = Arc::new(AtomicBool::new(false));

        core.hooks()
            .on::<channel::Start>()
            .register(self.name(), move |_| {
                if !started.swap(true, Ordering::SeqCst) {
                    tokio::spawn(rebuild_loop(weak.clone(), interval));
                }
                async { Ok(()) }
            });
    }
}

async fn rebuild_loop(core: Weak<Core>, interval: Duration) {
    loop {
        let Some(strong) = core.upgrade() else {
            break;
        };
        match strong.build_all().await {
            Ok(summary) if summary.is_success() => {
                info!(built = ?summary.built, "scheduled rebuild finished");
            }
            Ok(summary) => {
                warn!(failed = ?summary.failed, "scheduled rebuild finished with failures");
            }
            Err(err) => strong.report_error(NAMESPACE, &err),
        }
        drop(strong);
        tokio::time::sleep(interval).await;
    }
}
