use serde::Serialize;
use serde_json::Value;

use super::{Channel, ChannelId, ListenerSet, Listeners};
use crate::builder::BuildLog;
use crate::host::RouteTable;
use crate::manifest::ManifestEntry;

/// Payload of the `start` channel
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StartEvent;

/// Payload of the `beforeRender` and `render` channels
#[derive(Debug, Clone, Serialize)]
pub struct RenderEvent {
    pub library: String,
    pub component: String,
    pub input: Value,
}

/// Payload of the `error` channel
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    /// Where the error was raised, e.g. `theia:builder widgets`
    pub namespace: String,
    pub message: String,
}

/// Payload of the `libraryUpdated` and `libraryLoaded` channels
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEvent {
    pub library: String,
    pub entry: ManifestEntry,
}

/// Payload of the `buildTick` channel, published at every stage transition
#[derive(Debug, Clone, Serialize)]
pub struct BuildTickEvent {
    pub library: String,
    pub log: BuildLog,
}

/// Payload of the host-integration channel
///
/// Plugins add their endpoints to `routes`; the host serves whatever the table
/// holds once the dispatch has settled.
#[derive(Clone)]
pub struct HostEvent {
    pub routes: RouteTable,
}

/// Channel markers
pub mod channel {
    use super::*;

    macro_rules! channels {
        ($($(#[$doc:meta])* $name:ident => $field:ident: $payload:ty;)*) => {
            $(
                $(#[$doc])*
                pub struct $name;

                impl Channel for $name {
                    type Payload = $payload;

                    const ID: ChannelId = ChannelId::$name;

                    fn listeners(all: &Listeners) -> &ListenerSet<Self::Payload> {
                        &all.$field
                    }
                }
            )*
        };
    }

    channels! {
        /// Process start, dispatched once by `Core::start`
        Start => start: StartEvent;
        /// Before a component is rendered
        BeforeRender => before_render: RenderEvent;
        /// After a component was rendered
        Render => render: RenderEvent;
        /// Errors raised anywhere in the core or by other listeners
        Error => error: ErrorEvent;
        /// A new manifest entry was appended
        LibraryUpdated => library_updated: LibraryEvent;
        /// A component registry was loaded into the cache
        LibraryLoaded => library_loaded: LibraryEvent;
        /// Build stage transitions
        BuildTick => build_tick: BuildTickEvent;
        /// Wiring into an external HTTP layer
        Host => host: HostEvent;
    }
}
