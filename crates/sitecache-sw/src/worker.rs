//! Event entry points.
//!
//! Every entry point that does asynchronous work spawns it and hands back a
//! [`WaitUntil`] handle. The host awaits the handle before treating the event
//! as done.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use sitecache_common::Clock;
use sitecache_net::{Fetcher, Request};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clients::Clients;
use crate::command::{Command, CommandReply};
use crate::config::SiteConfig;
use crate::lifecycle::{
    ActivationReport, LifecycleManager, Registration, WorkerEvent, WorkerId, WorkerState,
};
use crate::notification::{route_click, ClickOutcome, Notification, NotificationClick};
use crate::router::{Route, Router};
use crate::store::CacheStore;
use crate::strategy::{FetchReply, StrategyEngine};
use crate::sync::{ContentSync, SyncReport, SYNC_CONTENT_TAG};
use crate::{Result, SwError};

// ==================== Host ====================

/// Host-provided primitives and shared state.
///
/// Cloning is cheap; every worker version on one host shares the same store,
/// registration, clients and lifecycle lock.
#[derive(Clone)]
pub struct Host {
    pub store: Arc<dyn CacheStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub clock: Arc<dyn Clock>,
    pub registration: Arc<RwLock<Registration>>,
    pub clients: Arc<RwLock<Clients>>,
    /// Serializes install, activate and cache clearing.
    pub(crate) lifecycle_lock: Arc<Mutex<()>>,
    pub(crate) events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Host {
    /// Create a host and the receiver for its lifecycle events.
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let host = Self {
            store,
            fetcher,
            clock,
            registration: Arc::new(RwLock::new(Registration::new())),
            clients: Arc::new(RwLock::new(Clients::new())),
            lifecycle_lock: Arc::new(Mutex::new(())),
            events,
        };
        (host, rx)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

// ==================== Completion Token ====================

/// Handle to an event's in-flight work.
#[must_use = "the event is not done until the handle is awaited"]
#[derive(Debug)]
pub struct WaitUntil<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> WaitUntil<T> {
    fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(work),
        }
    }

    /// Wait for the work to finish.
    pub async fn wait(self) -> Result<T> {
        self.handle
            .await
            .map_err(|e| SwError::TaskFailed(e.to_string()))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abandon the work.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

// ==================== Worker ====================

/// One deployed version of the caching worker.
#[derive(Debug, Clone)]
pub struct SiteWorker {
    config: Arc<SiteConfig>,
    host: Host,
    router: Router,
    engine: StrategyEngine,
    lifecycle: LifecycleManager,
    sync: ContentSync,
}

impl SiteWorker {
    pub fn new(config: SiteConfig, host: Host) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let router = Router::new(&config);
        let engine = StrategyEngine::new(
            Arc::clone(&config),
            Arc::clone(&host.store),
            Arc::clone(&host.fetcher),
            Arc::clone(&host.clock),
        )?;
        let lifecycle = LifecycleManager::new(Arc::clone(&config), host.clone())?;
        let sync = ContentSync::new(
            Arc::clone(&config),
            Arc::clone(&host.store),
            Arc::clone(&host.fetcher),
        );
        Ok(Self {
            config,
            host,
            router,
            engine,
            lifecycle,
            sync,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.lifecycle.id()
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.state().await
    }

    /// Install event: precache and pin the offline page.
    pub fn install(&self) -> WaitUntil<()> {
        let lifecycle = self.lifecycle.clone();
        WaitUntil::spawn(async move { lifecycle.install().await })
    }

    /// Activate event: sweep stale caches and claim open pages.
    pub fn activate(&self) -> WaitUntil<ActivationReport> {
        let lifecycle = self.lifecycle.clone();
        WaitUntil::spawn(async move { lifecycle.activate().await })
    }

    /// Fetch event. Cross-origin requests are passed through untouched.
    pub fn handle_fetch(&self, request: Request) -> WaitUntil<FetchReply> {
        let route = self.router.route(&request);
        let engine = self.engine.clone();
        WaitUntil::spawn(async move {
            match route {
                Route::Passthrough => Ok(FetchReply::passthrough()),
                Route::Intercept(strategy) => {
                    debug!(url = %request.url, ?strategy, "Intercepted request");
                    engine.respond(strategy, &request).await
                }
            }
        })
    }

    /// Message event. Unrecognized messages are ignored.
    pub fn handle_message(
        &self,
        message: &Value,
        reply: Option<oneshot::Sender<CommandReply>>,
    ) -> WaitUntil<()> {
        match Command::parse(message) {
            Some(command) => self.handle_command(command, reply),
            None => WaitUntil::spawn(async { Ok(()) }),
        }
    }

    pub fn handle_command(
        &self,
        command: Command,
        reply: Option<oneshot::Sender<CommandReply>>,
    ) -> WaitUntil<()> {
        debug!(?command, "Received command");
        let worker = self.clone();
        WaitUntil::spawn(async move {
            match command {
                Command::ClearCache => {
                    let result = worker.lifecycle.clear_caches().await;
                    if let Some(reply) = reply {
                        let success = result.is_ok();
                        if reply.send(CommandReply { success }).is_err() {
                            debug!("Command reply dropped, requester went away");
                        }
                    }
                    result.map(|_| ())
                }
                Command::SyncContent => worker.sync.run().await.map(|_| ()),
                Command::SkipWaiting => {
                    worker.lifecycle.skip_waiting().await;
                    Ok(())
                }
            }
        })
    }

    /// Deferred-retry event. Returns `None` for tags this worker does not
    /// handle.
    pub fn handle_sync(&self, tag: &str) -> Option<WaitUntil<SyncReport>> {
        if tag != SYNC_CONTENT_TAG {
            warn!(tag, "Ignoring unknown sync tag");
            return None;
        }
        info!(tag, "Background sync triggered");
        let sync = self.sync.clone();
        Some(WaitUntil::spawn(async move { sync.run().await }))
    }

    /// Push event: the notification to display.
    pub fn handle_push(&self, data: Option<&[u8]>) -> Notification {
        let notification = Notification::from_push(&self.config, data);
        info!(url = %notification.data.url, "Push notification received");
        notification
    }

    /// Notification click: focus or open the target page.
    pub fn notification_click(&self, click: NotificationClick) -> WaitUntil<ClickOutcome> {
        let config = Arc::clone(&self.config);
        let clients = Arc::clone(&self.host.clients);
        WaitUntil::spawn(async move {
            let mut clients = clients.write().await;
            route_click(&click, &mut clients, &config)
        })
    }
}
