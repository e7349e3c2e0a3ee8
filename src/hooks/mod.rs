//! Lifecycle hook dispatcher
//!
//! Plugins observe the core through a fixed set of channels. Each channel is a
//! marker type in [`channel`] bound at compile time to one payload type, so a
//! listener on `channel::BeforeRender` always receives a [`RenderEvent`].
//!
//! Every dispatch runs all listeners of the channel in parallel, each as its
//! own task, and waits for all of them to settle. A failing or panicking
//! listener is recorded and never affects the other listeners.
//!
//! Two disciplines are offered:
//! - [`HookDispatcher::dispatch`] / [`HookDispatcher::dispatch_logged`] block
//!   the caller until every listener has settled.
//! - [`HookDispatcher::dispatch_detached`] returns immediately. The listeners
//!   run to completion in the background with no completion signal and no
//!   cancellation; failures are routed to the error channel. Outstanding
//!   detached work can be awaited with [`HookDispatcher::settle`].

pub mod events;

pub use events::{
    channel, BuildTickEvent, ErrorEvent, HostEvent, LibraryEvent, RenderEvent, StartEvent,
};

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinSet;

/// Identifier of a hook channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Start,
    BeforeRender,
    Render,
    Error,
    LibraryUpdated,
    LibraryLoaded,
    BuildTick,
    Host,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Start => write!(f, "start"),
            ChannelId::BeforeRender => write!(f, "beforeRender"),
            ChannelId::Render => write!(f, "render"),
            ChannelId::Error => write!(f, "error"),
            ChannelId::LibraryUpdated => write!(f, "libraryUpdated"),
            ChannelId::LibraryLoaded => write!(f, "libraryLoaded"),
            ChannelId::BuildTick => write!(f, "buildTick"),
            ChannelId::Host => write!(f, "host"),
        }
    }
}

/// A statically defined hook channel and its payload type
pub trait Channel: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;

    const ID: ChannelId;

    /// The listener set backing this channel
    fn listeners(all: &Listeners) -> &ListenerSet<Self::Payload>;
}

type ListenerFn<P> = Arc<dyn Fn(P) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Registered<P> {
    id: u64,
    name: String,
    listener: ListenerFn<P>,
}

/// Handle returned by registration, used to remove the listener later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle {
    pub channel: ChannelId,
    id: u64,
}

/// Listeners attached to a single channel
pub struct ListenerSet<P> {
    channel: ChannelId,
    next_id: AtomicU64,
    entries: RwLock<Vec<Registered<P>>>,
}

impl<P: Clone + Send + Sync + 'static> ListenerSet<P> {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Attach a named listener to this channel
    pub fn register<F, Fut>(&self, name: impl Into<String>, listener: F) -> HookHandle
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: ListenerFn<P> = Arc::new(move |payload| Box::pin(listener(payload)));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registered {
                id,
                name: name.into(),
                listener,
            });

        HookHandle {
            channel: self.channel,
            id,
        }
    }

    /// Number of attached listeners
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<(String, ListenerFn<P>)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.listener)))
            .collect()
    }
}

/// All channel listener sets
pub struct Listeners {
    start: ListenerSet<StartEvent>,
    before_render: ListenerSet<RenderEvent>,
    render: ListenerSet<RenderEvent>,
    error: ListenerSet<ErrorEvent>,
    library_updated: ListenerSet<LibraryEvent>,
    library_loaded: ListenerSet<LibraryEvent>,
    build_tick: ListenerSet<BuildTickEvent>,
    host: ListenerSet<HostEvent>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self {
            start: ListenerSet::new(ChannelId::Start),
            before_render: ListenerSet::new(ChannelId::BeforeRender),
            render: ListenerSet::new(ChannelId::Render),
            error: ListenerSet::new(ChannelId::Error),
            library_updated: ListenerSet::new(ChannelId::LibraryUpdated),
            library_loaded: ListenerSet::new(ChannelId::LibraryLoaded),
            build_tick: ListenerSet::new(ChannelId::BuildTick),
            host: ListenerSet::new(ChannelId::Host),
        }
    }
}

/// One listener that failed during a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerFailure {
    pub listener: String,
    pub message: String,
}

/// Failures collected from a single dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct HookError {
    pub channel: ChannelId,
    pub failures: Vec<ListenerFailure>,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} listener(s) failed on {}", self.failures.len(), self.channel)?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.listener, failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for HookError {}

struct Inner {
    listeners: Listeners,
    detached: Mutex<JoinSet<()>>,
}

/// Typed publish/subscribe dispatcher shared by the core and its plugins
#[derive(Clone)]
pub struct HookDispatcher {
    inner: Arc<Inner>,
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Listeners::default(),
                detached: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Listener set of channel `C`, used to register listeners
    pub fn on<C: Channel>(&self) -> &ListenerSet<C::Payload> {
        C::listeners(&self.inner.listeners)
    }

    /// Detach a previously registered listener
    pub fn remove(&self, handle: HookHandle) -> bool {
        let all = &self.inner.listeners;
        match handle.channel {
            ChannelId::Start => all.start.remove(handle.id),
            ChannelId::BeforeRender => all.before_render.remove(handle.id),
            ChannelId::Render => all.render.remove(handle.id),
            ChannelId::Error => all.error.remove(handle.id),
            ChannelId::LibraryUpdated => all.library_updated.remove(handle.id),
            ChannelId::LibraryLoaded => all.library_loaded.remove(handle.id),
            ChannelId::BuildTick => all.build_tick.remove(handle.id),
            ChannelId::Host => all.host.remove(handle.id),
        }
    }

    /// Run every listener of `C` in parallel and wait for all of them
    pub async fn dispatch<C: Channel>(&self, payload: C::Payload) -> Result<(), HookError> {
        let listeners = C::listeners(&self.inner.listeners).snapshot();
        if listeners.is_empty() {
            return Ok(());
        }

        let running: Vec<_> = listeners
            .into_iter()
            .map(|(name, listener)| {
                let payload = payload.clone();
                (name, tokio::spawn(async move { listener(payload).await }))
            })
            .collect();

        let mut failures = Vec::new();
        for (listener, task) in running {
            let message = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(join_err) if join_err.is_panic() => "listener panicked".to_string(),
                Err(join_err) => join_err.to_string(),
            };
            failures.push(ListenerFailure { listener, message });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HookError {
                channel: C::ID,
                failures,
            })
        }
    }

    /// Blocking dispatch whose failures go to the error channel instead of the caller
    pub async fn dispatch_logged<C: Channel>(&self, payload: C::Payload) {
        if let Err(err) = self.dispatch::<C>(payload).await {
            self.route_failure(err);
        }
    }

    /// Fire-and-forget dispatch tracked until [`HookDispatcher::settle`]
    pub fn dispatch_detached<C: Channel>(&self, payload: C::Payload) {
        let this = self.clone();
        self.track(async move {
            if let Err(err) = this.dispatch::<C>(payload).await {
                this.route_failure(err);
            }
        });
    }

    /// Log an error and publish it on the error channel
    pub fn report_error(&self, namespace: impl Into<String>, message: impl fmt::Display) {
        let event = ErrorEvent {
            namespace: namespace.into(),
            message: message.to_string(),
        };
        tracing::error!(namespace = %event.namespace, "{}", event.message);

        let this = self.clone();
        self.track(async move {
            let namespace = event.namespace.clone();
            if let Err(err) = this.dispatch::<channel::Error>(event).await {
                // Never re-dispatched, error listeners cannot loop.
                tracing::error!(
                    namespace = %namespace,
                    "there was an error in the error handling hooks: {err}"
                );
            }
        });
    }

    /// Wait for every detached dispatch, including ones spawned while waiting
    pub async fn settle(&self) {
        loop {
            let mut pending = {
                let mut detached = self
                    .inner
                    .detached
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *detached)
            };
            if pending.is_empty() {
                return;
            }
            while pending.join_next().await.is_some() {}
        }
    }

    /// Number of detached dispatches that have not been reaped yet
    pub fn pending(&self) -> usize {
        let mut detached = self
            .inner
            .detached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while detached.try_join_next().is_some() {}
        detached.len()
    }

    fn route_failure(&self, err: HookError) {
        if err.channel == ChannelId::Error {
            tracing::error!("there was an error in the error handling hooks: {err}");
        } else {
            self.report_error(format!("theia:hooks:{}", err.channel), err);
        }
    }

    fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut detached = self
            .inner
            .detached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while detached.try_join_next().is_some() {}
        detached.spawn(task);
    }
}
