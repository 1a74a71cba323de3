//! Pages (clients) the worker can see and control.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use url::Url;

use crate::lifecycle::WorkerId;
use crate::{Result, SwError};

/// Client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    /// Match filter only.
    All,
}

/// A client (open page or worker).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    /// Worker controlling this client, if any.
    pub controller: Option<WorkerId>,
}

impl Client {
    /// An uncontrolled, unfocused window at `url`.
    pub fn window(url: Url) -> Self {
        Self {
            id: ClientId::new(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Clients of the given type, ordered by id (oldest first).
    pub fn match_all(&self, client_type: ClientType) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| client_type == ClientType::All || c.client_type == client_type)
            .collect();
        matched.sort_by_key(|c| c.id);
        matched
    }

    /// Open a focused window at `url`.
    pub fn open_window(&mut self, url: Url) -> Client {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
        let client = Client {
            focused: true,
            ..Client::window(url)
        };
        self.clients.insert(client.id, client.clone());
        client
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: ClientId) -> Result<&Client> {
        let is_window = match self.clients.get(&id) {
            Some(client) => client.client_type == ClientType::Window,
            None => return Err(SwError::StateError(format!("no client {id:?}"))),
        };
        if !is_window {
            return Err(SwError::StateError(
                "Can only focus window clients".to_string(),
            ));
        }
        for (cid, client) in self.clients.iter_mut() {
            client.focused = *cid == id;
        }
        self.clients
            .get(&id)
            .ok_or_else(|| SwError::StateError(format!("no client {id:?}")))
    }

    /// Put every window client under `worker`'s control. Returns the clients
    /// whose controller changed.
    pub fn claim(&mut self, worker: WorkerId) -> Vec<ClientId> {
        let mut changed: Vec<ClientId> = self
            .clients
            .values_mut()
            .filter(|c| c.client_type == ClientType::Window && c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id
            })
            .collect();
        changed.sort();
        changed
    }

    /// Clients currently controlled by `worker`.
    pub fn controlled_by(&self, worker: WorkerId) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .count()
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id, client);
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_open_window() {
        let mut clients = Clients::new();
        let client = clients.open_window(url("https://example.com/"));
        assert_eq!(client.client_type, ClientType::Window);
        assert!(client.focused);
        assert!(clients.get(client.id).is_some());
    }

    #[test]
    fn test_focus_moves_between_windows() {
        let mut clients = Clients::new();
        let a = clients.open_window(url("https://example.com/a"));
        let b = clients.open_window(url("https://example.com/b"));
        assert!(!clients.get(a.id).unwrap().focused);

        clients.focus(a.id).unwrap();
        assert!(clients.get(a.id).unwrap().focused);
        assert!(!clients.get(b.id).unwrap().focused);
    }

    #[test]
    fn test_focus_rejects_worker_clients() {
        let mut clients = Clients::new();
        let worker = Client {
            client_type: ClientType::Worker,
            ..Client::window(url("https://example.com/w.js"))
        };
        let id = worker.id;
        clients.add(worker);
        assert!(clients.focus(id).is_err());
    }

    #[test]
    fn test_claim_windows_only() {
        let mut clients = Clients::new();
        let page = Client::window(url("https://example.com/"));
        let worker = Client {
            client_type: ClientType::Worker,
            ..Client::window(url("https://example.com/w.js"))
        };
        let page_id = page.id;
        clients.add(page);
        clients.add(worker);

        let owner = WorkerId::new();
        assert_eq!(clients.claim(owner), vec![page_id]);
        assert_eq!(clients.controlled_by(owner), 1);
        // Already controlled: nothing changes.
        assert!(clients.claim(owner).is_empty());
    }

    #[test]
    fn test_match_all_filter() {
        let mut clients = Clients::new();
        clients.open_window(url("https://example.com/"));
        clients.add(Client {
            client_type: ClientType::Worker,
            ..Client::window(url("https://example.com/w.js"))
        });
        assert_eq!(clients.match_all(ClientType::Window).len(), 1);
        assert_eq!(clients.match_all(ClientType::All).len(), 2);
    }
}
