//! Worker lifecycle: install, activate, skip-waiting and cache clearing.
//!
//! ```text
//! Uninstalled ──► Installing ──► Installed (waiting) ──► Activating ──► Active
//!                     │                                                  │
//!                     └──► Redundant (install failed)      Redundant ◄───┘ (replaced)
//! ```
//!
//! A new version installing while an older one is active is an update; the
//! newcomer waits until it receives the skip-waiting signal, which install
//! always sends on success.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use sitecache_net::Request;
use tracing::{debug, error, info, warn};

use crate::clients::ClientId;
use crate::config::SiteConfig;
use crate::offline::OfflinePage;
use crate::versions::{Namespace, VersionConfig};
use crate::worker::Host;
use crate::{Result, SwError};

// ==================== Types ====================

/// Unique identifier for a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Not known to the registration.
    #[default]
    Uninstalled,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    /// Active and controlling pages.
    Active,
    /// Install failed, or replaced by a newer version.
    Redundant,
}

/// Lifecycle notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    StateChange {
        worker_id: WorkerId,
        state: WorkerState,
    },
    SkipWaiting {
        worker_id: WorkerId,
    },
    ControllerChange {
        client_id: ClientId,
        worker_id: WorkerId,
    },
}

/// One deployed version of the worker.
#[derive(Debug, Clone)]
pub struct WorkerVersion {
    pub id: WorkerId,
    pub versions: VersionConfig,
    pub state: WorkerState,
    pub skip_waiting: bool,
    pub state_changed_at: Instant,
}

impl WorkerVersion {
    fn new(id: WorkerId, versions: VersionConfig) -> Self {
        Self {
            id,
            versions,
            state: WorkerState::Installing,
            skip_waiting: false,
            state_changed_at: Instant::now(),
        }
    }

    fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }
}

// ==================== Registration ====================

/// Retired versions kept for state queries; older ones report `Uninstalled`.
const REDUNDANT_HISTORY: usize = 8;

/// Host-side record of installing, waiting and active worker versions.
#[derive(Debug, Default)]
pub struct Registration {
    installing: Option<WorkerVersion>,
    waiting: Option<WorkerVersion>,
    active: Option<WorkerVersion>,
    redundant: VecDeque<WorkerVersion>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installing(&self) -> Option<&WorkerVersion> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&WorkerVersion> {
        self.waiting.as_ref()
    }

    pub fn active(&self) -> Option<&WorkerVersion> {
        self.active.as_ref()
    }

    /// A newer version is installing or waiting behind an active one.
    pub fn is_updating(&self) -> bool {
        self.active.is_some() && (self.installing.is_some() || self.waiting.is_some())
    }

    pub fn state_of(&self, id: WorkerId) -> WorkerState {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .chain(self.redundant.iter())
            .find(|w| w.id == id)
            .map(|w| w.state)
            .unwrap_or_default()
    }

    fn retire(&mut self, mut worker: WorkerVersion) {
        worker.set_state(WorkerState::Redundant);
        if self.redundant.len() == REDUNDANT_HISTORY {
            self.redundant.pop_front();
        }
        self.redundant.push_back(worker);
    }

    /// Start installing `id`. A different version still installing is replaced.
    fn begin_install(&mut self, id: WorkerId, versions: VersionConfig) -> Result<()> {
        match self.state_of(id) {
            WorkerState::Uninstalled => {}
            state => {
                return Err(SwError::StateError(format!(
                    "worker {id:?} cannot install from {state:?}"
                )))
            }
        }
        if let Some(previous) = self.installing.take() {
            self.retire(previous);
        }
        self.installing = Some(WorkerVersion::new(id, versions));
        Ok(())
    }

    /// Installing → Installed. A previously waiting version is replaced.
    fn install_complete(&mut self, id: WorkerId) -> Result<()> {
        let mut worker = self.take_installing(id)?;
        worker.set_state(WorkerState::Installed);
        if let Some(previous) = self.waiting.replace(worker) {
            self.retire(previous);
        }
        Ok(())
    }

    fn install_failed(&mut self, id: WorkerId) {
        if let Ok(worker) = self.take_installing(id) {
            self.retire(worker);
        }
    }

    fn take_installing(&mut self, id: WorkerId) -> Result<WorkerVersion> {
        match self.installing.take() {
            Some(worker) if worker.id == id => Ok(worker),
            other => {
                self.installing = other;
                Err(SwError::StateError(format!("worker {id:?} is not installing")))
            }
        }
    }

    /// Record the skip-waiting signal. Returns false for unknown workers.
    fn skip_waiting(&mut self, id: WorkerId) -> bool {
        for worker in [&mut self.installing, &mut self.waiting, &mut self.active]
            .into_iter()
            .flatten()
        {
            if worker.id == id {
                worker.skip_waiting = true;
                return true;
            }
        }
        false
    }

    /// Waiting → Activating; the previous active version is retired.
    fn begin_activate(&mut self, id: WorkerId) -> Result<Option<WorkerId>> {
        let signalled = match self.waiting.as_ref() {
            Some(worker) if worker.id == id => worker.skip_waiting,
            _ => {
                return Err(SwError::StateError(format!(
                    "worker {id:?} is not waiting (state {:?})",
                    self.state_of(id)
                )))
            }
        };
        if !signalled && self.active.is_some() {
            return Err(SwError::StateError(format!(
                "worker {id:?} is waiting for the active version to release its pages"
            )));
        }

        let mut worker = self
            .waiting
            .take()
            .ok_or_else(|| SwError::StateError(format!("worker {id:?} is not waiting")))?;
        worker.set_state(WorkerState::Activating);
        let replaced = self.active.replace(worker).map(|old| {
            let old_id = old.id;
            self.retire(old);
            old_id
        });
        Ok(replaced)
    }

    fn activate_complete(&mut self, id: WorkerId) -> Result<()> {
        match self.active {
            Some(ref mut worker) if worker.id == id => {
                worker.set_state(WorkerState::Active);
                Ok(())
            }
            _ => Err(SwError::StateError(format!("worker {id:?} is not activating"))),
        }
    }
}

// ==================== Lifecycle Manager ====================

/// Outcome of a completed activation.
#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    /// Stale caches removed.
    pub deleted: Vec<String>,
    /// Pages newly controlled.
    pub claimed: Vec<ClientId>,
    /// The version this one replaced.
    pub replaced: Option<WorkerId>,
}

/// Drives one worker version through its lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    id: WorkerId,
    config: Arc<SiteConfig>,
    host: Host,
    offline: OfflinePage,
}

impl LifecycleManager {
    pub fn new(config: Arc<SiteConfig>, host: Host) -> Result<Self> {
        let offline = OfflinePage::new(&config)?;
        Ok(Self {
            id: WorkerId::new(),
            config,
            host,
            offline,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub async fn state(&self) -> WorkerState {
        self.host.registration.read().await.state_of(self.id)
    }

    /// Precache the static asset list and pin the offline page.
    ///
    /// Any asset failing to load fails the whole install and retires this
    /// version. On success the skip-waiting signal is sent.
    pub async fn install(&self) -> Result<()> {
        let _guard = self.host.lifecycle_lock.lock().await;

        self.host
            .registration
            .write()
            .await
            .begin_install(self.id, self.config.versions.clone())?;
        self.emit_state(WorkerState::Installing);
        info!(worker = ?self.id, cache = %self.config.versions.static_cache, "Installing");

        let store = self.host.store.as_ref();
        let result = tokio::try_join!(self.precache_static(), self.offline.pin(store));

        match result {
            Ok((count, ())) => {
                self.host
                    .registration
                    .write()
                    .await
                    .install_complete(self.id)?;
                self.emit_state(WorkerState::Installed);
                info!(worker = ?self.id, assets = count, "Installation complete");
                self.skip_waiting().await;
                Ok(())
            }
            Err(e) => {
                self.host.registration.write().await.install_failed(self.id);
                self.emit_state(WorkerState::Redundant);
                error!(worker = ?self.id, error = %e, "Installation failed");
                Err(e)
            }
        }
    }

    /// Fetch every static asset, then store them all. Nothing is stored
    /// unless every asset loaded with a 2xx status.
    async fn precache_static(&self) -> Result<usize> {
        let cache = self
            .host
            .store
            .open(self.config.versions.name(Namespace::Static))
            .await?;

        let requests = self
            .config
            .static_assets
            .iter()
            .map(|path| Ok(Request::get(self.config.resolve(path)?)))
            .collect::<Result<Vec<_>>>()?;

        let fetcher = self.host.fetcher.as_ref();
        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = fetcher.fetch(request).await.map_err(|e| {
                SwError::InstallFailed(format!("failed to fetch {}: {e}", request.url))
            })?;
            if !response.ok() {
                return Err(SwError::InstallFailed(format!(
                    "{} returned {}",
                    request.url, response.status
                )));
            }
            Ok(response)
        }))
        .await?;

        let count = responses.len();
        for (request, response) in requests.iter().zip(responses) {
            cache.put(request.key(), response).await?;
        }
        debug!(cache = %cache.name(), assets = count, "Precached static assets");
        Ok(count)
    }

    /// Signal that this version may replace the active one without waiting
    /// for its pages to close.
    pub async fn skip_waiting(&self) {
        if self.host.registration.write().await.skip_waiting(self.id) {
            debug!(worker = ?self.id, "Skip waiting");
            self.emit(WorkerEvent::SkipWaiting { worker_id: self.id });
        } else {
            warn!(worker = ?self.id, "Skip waiting for a worker the registration does not know");
        }
    }

    /// Sweep caches from other versions and take control of every open page.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let _guard = self.host.lifecycle_lock.lock().await;

        let replaced = self
            .host
            .registration
            .write()
            .await
            .begin_activate(self.id)?;
        self.emit_state(WorkerState::Activating);
        info!(worker = ?self.id, replaced = ?replaced, "Activating");

        let deleted = match self.sweep_stale().await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(worker = ?self.id, error = %e, "Stale cache sweep failed");
                Vec::new()
            }
        };

        let claimed = self.host.clients.write().await.claim(self.id);
        for client_id in &claimed {
            self.emit(WorkerEvent::ControllerChange {
                client_id: *client_id,
                worker_id: self.id,
            });
        }

        self.host
            .registration
            .write()
            .await
            .activate_complete(self.id)?;
        self.emit_state(WorkerState::Active);
        info!(
            worker = ?self.id,
            deleted = deleted.len(),
            claimed = claimed.len(),
            "Activation complete"
        );

        Ok(ActivationReport {
            deleted,
            claimed,
            replaced,
        })
    }

    async fn sweep_stale(&self) -> Result<Vec<String>> {
        let names = self.host.store.keys().await?;
        let mut deleted = Vec::new();
        for name in self.config.versions.stale(&names) {
            info!(cache = %name, "Deleting old cache");
            if self.host.store.delete(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Delete every cache, current versions included.
    pub async fn clear_caches(&self) -> Result<usize> {
        let _guard = self.host.lifecycle_lock.lock().await;

        let names = self.host.store.keys().await?;
        let mut deleted = 0;
        for name in &names {
            if self.host.store.delete(name).await? {
                deleted += 1;
            }
        }
        info!(deleted, "Cleared all caches");
        Ok(deleted)
    }

    fn emit_state(&self, state: WorkerState) {
        self.emit(WorkerEvent::StateChange {
            worker_id: self.id,
            state,
        });
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.host.events.send(event);
    }
}
