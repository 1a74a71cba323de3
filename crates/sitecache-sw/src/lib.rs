//! # Sitecache SW
//!
//! Offline caching and request interception for a static marketing site.
//!
//! ## Features
//!
//! - **Routing**: each same-origin request is mapped to exactly one strategy
//! - **Strategies**: network-first, network-first with TTL, cache-first, network with cache fallback
//! - **Lifecycle**: install (precache + pin offline page), activate (sweep stale versions, claim pages)
//! - **Commands**: `CLEAR_CACHE`, `SYNC_CONTENT`, `SKIP_WAITING` from controlled pages
//! - **Content sync**: best-effort refresh of key pages into the dynamic cache
//! - **Notifications**: push payload mapping and click routing
//!
//! ## Architecture
//!
//! ```text
//! SiteWorker (event entry points, returns WaitUntil handles)
//!     ├── Router ──► StrategyEngine ──► Fetcher (network)
//!     │                    └──────────► CacheStore (named caches)
//!     ├── OfflinePage
//!     ├── LifecycleManager ──► Registration (installing / waiting / active)
//!     │                   └──► Clients (controlled pages)
//!     ├── ContentSync
//!     └── notification (push → Notification, click → focus/open)
//! ```

use sitecache_net::NetError;
use thiserror::Error;

pub mod clients;
pub mod command;
pub mod config;
pub mod lifecycle;
pub mod notification;
pub mod offline;
pub mod router;
pub mod store;
pub mod strategy;
pub mod sync;
pub mod testing;
pub mod versions;
pub mod worker;

pub use clients::{Client, ClientId, ClientType, Clients};
pub use command::{Command, CommandReply};
pub use config::{NotificationConfig, SiteConfig};
pub use lifecycle::{
    ActivationReport, LifecycleManager, Registration, WorkerEvent, WorkerId, WorkerState,
};
pub use notification::{ClickOutcome, Notification, NotificationClick};
pub use offline::OfflinePage;
pub use router::{Route, Router};
pub use store::{CacheStore, MemoryCacheStore, NamedCache};
pub use strategy::{FetchOutcome, FetchReply, PendingWrites, ResponseSource, Strategy};
pub use sync::{ContentSync, SyncReport, SYNC_CONTENT_TAG};
pub use versions::{Namespace, VersionConfig};
pub use worker::{Host, SiteWorker, WaitUntil};

// ==================== Errors ====================

/// Errors that can occur in the caching layer.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("{url} returned {status}")]
    UnexpectedStatus { url: url::Url, status: http::StatusCode },

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for caching-layer operations.
pub type Result<T> = std::result::Result<T, SwError>;
