//! Scripted network double for tests and local experiments.
//!
//! Pair with [`MemoryCacheStore`](crate::store::MemoryCacheStore) and
//! [`ManualClock`](sitecache_common::ManualClock) to drive the engine
//! deterministically without a host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::StatusCode;
use sitecache_net::{Fetcher, NetError, Request, Response};
use url::Url;

/// Scripted outcome for one path.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(Response),
    /// Reject as a network failure.
    Fail,
}

impl Reply {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Reply::Respond(Response::new(StatusCode::OK, body))
    }

    pub fn status(status: StatusCode) -> Self {
        Reply::Respond(Response::new(status, Bytes::new()))
    }
}

/// A [`Fetcher`] that answers from a per-path script.
///
/// Unscripted same-origin paths answer 404; other origins fail.
#[derive(Debug)]
pub struct ScriptedFetcher {
    origin: Url,
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Script the reply for `path`.
    pub fn respond(&self, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), reply);
    }

    /// Fail every request while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests seen for `path`, including failed ones.
    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let path = request.url.path().to_string();
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.clone())
            .or_insert(0) += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Unreachable(request.url.to_string()));
        }
        if request.url.origin() != self.origin.origin() {
            return Err(NetError::Unreachable(request.url.to_string()));
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&path)
            .cloned();
        match reply {
            Some(Reply::Respond(response)) => Ok(response.with_url(request.url.clone())),
            Some(Reply::Fail) => Err(NetError::RequestFailed(format!("scripted failure: {path}"))),
            None => Ok(Response::new(StatusCode::NOT_FOUND, Bytes::new()).with_url(request.url.clone())),
        }
    }
}
