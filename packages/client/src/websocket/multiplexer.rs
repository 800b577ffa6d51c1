use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::Channel;
use crate::websocket::connection::{channel_url, Connector};
use crate::websocket::message_handler::Handlers;
use crate::websocket::session::{Closer, Session, SessionHandle, SessionStatus, Sender};

type Routes = Arc<Mutex<HashMap<u64, Route>>>;

/// One registered live subscription.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: u64,
    pub channel: Channel,
    pub key: Option<String>,
    closer: Closer,
}

/// Opens one independent session per subscription and keeps a routing table
/// of what is live.
///
/// Sessions never share a transport. The table only tracks them so they can be
/// listed and shut down together.
pub struct ChannelMultiplexer {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    routes: Routes,
    next_id: AtomicU64,
}

fn lock(routes: &Mutex<HashMap<u64, Route>>) -> MutexGuard<'_, HashMap<u64, Route>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelMultiplexer {
    pub fn new(config: Arc<ClientConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            routes: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a live session on `channel`.
    ///
    /// For scoped channels `key` is sent as the first frame on every
    /// (re)connect, before the caller's `on_open` runs. Outside a tokio
    /// runtime this fails with [`ClientError::Config`].
    pub fn subscribe(
        &self,
        channel: Channel,
        key: Option<String>,
        handlers: Handlers,
    ) -> Result<Subscription, ClientError> {
        let url = channel_url(&self.config, channel)?;

        let key = match key {
            Some(key) if !channel.is_scoped() => {
                warn!("Channel {} takes no subscription key, ignoring '{}'", channel, key);
                None
            }
            key => key,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let routes = Arc::downgrade(&self.routes);
        let closer = Closer::new().with_hook(move || {
            if let Some(routes) = routes.upgrade() {
                lock(&routes).remove(&id);
            }
        });

        let Handlers {
            on_data,
            mut on_open,
            on_latency,
        } = handlers;
        let first_frame = key.clone();
        let on_open = move |sender: Sender, closer: Closer| {
            if let Some(key) = &first_frame {
                if !sender.send(key.as_str()) {
                    debug!("Subscription key for {} not sent, transport already gone", channel);
                }
            }
            on_open(sender, closer);
        };
        let handlers = Handlers::new(on_data, on_open, on_latency);

        lock(&self.routes).insert(
            id,
            Route {
                id,
                channel,
                key: key.clone(),
                closer: closer.clone(),
            },
        );

        info!("Subscribing to {} (key: {:?})", url, key);
        let handle = Session::with_closer(url, self.connector.clone(), &self.config, handlers, closer)
            .spawn()
            .map_err(|e| {
                lock(&self.routes).remove(&id);
                e
            })?;

        Ok(Subscription {
            id,
            channel,
            key,
            handle,
        })
    }

    pub fn active(&self) -> Vec<Route> {
        let mut routes: Vec<_> = lock(&self.routes).values().cloned().collect();
        routes.sort_by_key(|r| r.id);
        routes
    }

    pub fn active_on(&self, channel: Channel) -> Vec<Route> {
        self.active()
            .into_iter()
            .filter(|r| r.channel == channel)
            .collect()
    }

    /// Close every live session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        // Close outside the lock; each close hook takes it again.
        let closers: Vec<Closer> = lock(&self.routes)
            .values()
            .map(|r| r.closer.clone())
            .collect();
        for closer in &closers {
            closer.close();
        }
        if !closers.is_empty() {
            info!("Closed {} live subscriptions", closers.len());
        }
        closers.len()
    }
}

/// A live subscription.
///
/// Dropping it does not stop the stream; call [`Subscription::close`].
#[must_use = "the stream keeps running until closed"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    channel: Channel,
    key: Option<String>,
    handle: SessionHandle,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn closer(&self) -> Closer {
        self.handle.closer()
    }

    pub fn status(&self) -> SessionStatus {
        self.handle.status()
    }

    pub async fn closed(self) {
        self.handle.closed().await;
    }
}
