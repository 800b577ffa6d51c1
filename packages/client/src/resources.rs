//! Per-resource `get`/`live` bindings.
//!
//! Handles are plain values (an id or nothing) plus a client clone. Nothing is
//! cached; every call goes to the service.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::http::deliver;
use crate::models::Channel;
use crate::websocket::session::runtime_handle;
use crate::websocket::{Closer, Handlers, Sender, Subscription};
use crate::Ethrex;

/// Shared plumbing: one HTTP path and one streaming channel.
#[derive(Clone)]
struct Endpoint {
    client: Ethrex,
    path: String,
    channel: Channel,
    key: Option<String>,
}

impl Endpoint {
    fn new(client: &Ethrex, path: String, channel: Channel, key: Option<String>) -> Self {
        Self {
            client: client.clone(),
            path,
            channel,
            key,
        }
    }

    async fn fetch(&self) -> Result<Value, ClientError> {
        self.client.http().call(&self.path, &[], None).await
    }

    fn get<S, E>(&self, on_success: S, on_error: E) -> Result<JoinHandle<()>, ClientError>
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let endpoint = self.clone();
        Ok(runtime_handle()?.spawn(async move { deliver(endpoint.fetch().await, on_success, on_error) }))
    }

    fn live<D, O, L>(&self, on_data: D, on_open: O, on_latency: L) -> Result<Subscription, ClientError>
    where
        D: FnMut(Value) + Send + 'static,
        O: FnMut(Sender, Closer) + Send + 'static,
        L: FnMut(Duration) + Send + 'static,
    {
        self.client.multiplexer().subscribe(
            self.channel,
            self.key.clone(),
            Handlers::new(on_data, on_open, on_latency),
        )
    }
}

/// Implements the `fetch`/`get`/`live` trio shared by every id-scoped resource.
macro_rules! get_and_live {
    ($handle:ty) => {
        impl $handle {
            /// Fetch the current state.
            pub async fn fetch(&self) -> Result<Value, ClientError> {
                self.endpoint.fetch().await
            }

            /// Callback form of [`Self::fetch`]. A 404 calls `on_success(null)`
            /// and then `on_error`.
            pub fn get<S, E>(&self, on_success: S, on_error: E) -> Result<JoinHandle<()>, ClientError>
            where
                S: FnOnce(Value) + Send + 'static,
                E: FnOnce(String) + Send + 'static,
            {
                self.endpoint.get(on_success, on_error)
            }

            /// Subscribe to pushed updates.
            pub fn live<D, O, L>(
                &self,
                on_data: D,
                on_open: O,
                on_latency: L,
            ) -> Result<Subscription, ClientError>
            where
                D: FnMut(Value) + Send + 'static,
                O: FnMut(Sender, Closer) + Send + 'static,
                L: FnMut(Duration) + Send + 'static,
            {
                self.endpoint.live(on_data, on_open, on_latency)
            }
        }
    };
}

pub struct NetworkStatus {
    endpoint: Endpoint,
}

impl NetworkStatus {
    pub(crate) fn new(client: &Ethrex) -> Self {
        Self {
            endpoint: Endpoint::new(client, "network".to_string(), Channel::Network, None),
        }
    }
}

pub struct Block {
    endpoint: Endpoint,
}

impl Block {
    pub(crate) fn new(client: &Ethrex, id: String) -> Self {
        Self {
            endpoint: Endpoint::new(client, format!("blocks/{}", id), Channel::Blocks, Some(id)),
        }
    }
}

pub struct Transaction {
    id: String,
    endpoint: Endpoint,
}

impl Transaction {
    pub(crate) fn new(client: &Ethrex, id: String) -> Self {
        let endpoint = Endpoint::new(
            client,
            format!("transactions/{}", id),
            Channel::Transactions,
            Some(id.clone()),
        );
        Self { id, endpoint }
    }

    /// Execution trace. The service may take several seconds to produce it.
    pub async fn trace(&self) -> Result<Value, ClientError> {
        let path = format!("transactions/{}/trace", self.id);
        self.endpoint.client.http().call(&path, &[], None).await
    }
}

pub struct Account {
    id: String,
    endpoint: Endpoint,
}

impl Account {
    pub(crate) fn new(client: &Ethrex, id: String) -> Self {
        let endpoint = Endpoint::new(
            client,
            format!("accounts/{}", id),
            Channel::Accounts,
            Some(id.clone()),
        );
        Self { id, endpoint }
    }

    /// Submit contract source for verification against this address.
    pub async fn verify(
        &self,
        name: &str,
        source: String,
        version: &str,
        optimize: bool,
        url: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut params = vec![
            ("name", name.to_string()),
            ("version", version.to_string()),
            ("optimize", optimize.to_string()),
        ];
        if let Some(url) = url {
            params.push(("url", url.to_string()));
        }
        let path = format!("accounts/{}/verify", self.id);
        self.endpoint.client.http().call(&path, &params, Some(source)).await
    }

    /// Call a constant contract method with JSON arguments.
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<Value, ClientError> {
        let body = serde_json::to_string(args)?;
        let path = format!("accounts/{}/call/{}", self.id, method);
        self.endpoint.client.http().call(&path, &[], Some(body)).await
    }
}

pub struct Node {
    endpoint: Endpoint,
}

impl Node {
    pub(crate) fn new(client: &Ethrex, id: String) -> Self {
        Self {
            endpoint: Endpoint::new(client, format!("nodes/{}", id), Channel::Nodes, Some(id)),
        }
    }
}

get_and_live!(NetworkStatus);
get_and_live!(Block);
get_and_live!(Transaction);
get_and_live!(Account);
get_and_live!(Node);

/// Full-text search over the live search channel.
pub struct Search {
    client: Ethrex,
}

impl Search {
    pub(crate) fn new(client: &Ethrex) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// One-shot search: `on_result` runs exactly once, with the first message,
    /// after the subscription has been closed.
    pub fn get<F>(&self, query: impl Into<String>, on_result: F) -> Result<Subscription, ClientError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let slot: Arc<Mutex<Option<Closer>>> = Arc::default();
        let on_open_slot = slot.clone();
        let mut on_result = Some(on_result);

        self.client.multiplexer().subscribe(
            Channel::Search,
            Some(query.into()),
            Handlers::new(
                move |value| {
                    let Some(on_result) = on_result.take() else {
                        return;
                    };
                    if let Some(closer) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                        closer.close();
                    }
                    on_result(value);
                },
                move |_sender, closer| {
                    *on_open_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(closer);
                },
                |_| {},
            ),
        )
    }

    /// Resolve with the first search result.
    pub async fn fetch(&self, query: impl Into<String>) -> Result<Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        let subscription = self.get(query, move |value| {
            let _ = tx.send(value);
        })?;
        let _guard = CloseOnDrop(subscription.closer());

        rx.await
            .map_err(|_| ClientError::Transport("search closed before a result arrived".to_string()))
    }

    /// Open the search channel; queries are sent by the caller.
    pub fn live<D, O, L>(&self, on_data: D, on_open: O, on_latency: L) -> Result<Subscription, ClientError>
    where
        D: FnMut(Value) + Send + 'static,
        O: FnMut(Sender, Closer) + Send + 'static,
        L: FnMut(Duration) + Send + 'static,
    {
        self.client.multiplexer().subscribe(
            Channel::Search,
            None,
            Handlers::new(on_data, on_open, on_latency),
        )
    }
}

struct CloseOnDrop(Closer);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Caller-driven filter stream.
pub struct Filter {
    client: Ethrex,
}

impl Filter {
    pub(crate) fn new(client: &Ethrex) -> Self {
        Self {
            client: client.clone(),
        }
    }

    pub fn live<D, O, L>(&self, on_data: D, on_open: O, on_latency: L) -> Result<Subscription, ClientError>
    where
        D: FnMut(Value) + Send + 'static,
        O: FnMut(Sender, Closer) + Send + 'static,
        L: FnMut(Duration) + Send + 'static,
    {
        self.client.multiplexer().subscribe(
            Channel::Filter,
            None,
            Handlers::new(on_data, on_open, on_latency),
        )
    }
}

pub struct Solc {
    client: Ethrex,
}

impl Solc {
    pub(crate) fn new(client: &Ethrex) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// Compiler versions accepted by `Account::verify`.
    pub async fn versions(&self) -> Result<Value, ClientError> {
        self.client.http().call("misc/solc/versions", &[], None).await
    }
}
