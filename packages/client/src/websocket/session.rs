//! A single resilient streaming connection.
//!
//! Each session is one tokio task that exclusively owns its transport, its
//! check timer and the caller's callbacks:
//!
//! ```text
//! Connecting -> Open -> Reconnecting -> Open -> ... -> Closed
//! ```
//!
//! Transport errors and remote closes are only logged. The session is rebuilt
//! when the heartbeat times out, never because the socket said so.

use std::fmt;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, MAX_DURATION};
use crate::error::ClientError;
use crate::models::Frame;
use crate::websocket::codec;
use crate::websocket::connection::{Connector, FrameSink, FrameStream};
use crate::websocket::heartbeat::Heartbeat;
use crate::websocket::message_handler::{Dispatched, Handlers, MessageHandler, OpenHandler};

/// Bound on the graceful close handshake after a caller-initiated close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Shortest heartbeat period a session will run with.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

/// Observable snapshot of a session.
///
/// `transport_up` is what the socket reports; `healthy` is what the heartbeat
/// concludes. The two are deliberately independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub phase: Phase,
    pub transport_up: bool,
    pub healthy: bool,
    pub latency: Option<Duration>,
    pub generation: u64,
    pub reconnects: u32,
    pub framing_errors: u64,
}

/// Send capability for one transport generation.
///
/// Becomes a no-op (returning `false`) once that transport is replaced or the
/// session is closed.
#[derive(Debug, Clone)]
pub struct Sender {
    tx: mpsc::UnboundedSender<Frame>,
    generation: u64,
}

impl Sender {
    /// Queue a data frame. Returns `false` if this generation is gone.
    pub fn send(&self, payload: impl Into<Value>) -> bool {
        self.tx.send(Frame::data(payload)).is_ok()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Idempotent close capability shared by every copy handed out for a session.
#[derive(Clone, Default)]
pub struct Closer {
    token: CancellationToken,
    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` the first time the session is closed.
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(hook));
        self
    }

    pub fn close(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        if let Some(hook) = &self.on_close {
            hook();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer")
            .field("closed", &self.is_closed())
            .field("hook", &self.on_close.is_some())
            .finish()
    }
}

/// Caller-side handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    closer: Closer,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until the session task has finished.
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            warn!("Session task ended abnormally: {}", e);
        }
    }
}

enum Outcome {
    Closed,
    Stale,
}

pub struct Session {
    url: Url,
    connector: Arc<dyn Connector>,
    reconnect: bool,
    socket_timeout: Duration,
    heartbeat_interval: Duration,
    on_open: OpenHandler,
    handler: MessageHandler,
    closer: Closer,
    status: watch::Sender<SessionStatus>,
}

impl Session {
    pub fn new(
        url: Url,
        connector: Arc<dyn Connector>,
        config: &ClientConfig,
        handlers: Handlers,
    ) -> Self {
        Self::with_closer(url, connector, config, handlers, Closer::new())
    }

    /// Build a session whose lifetime is governed by an existing `Closer`.
    pub fn with_closer(
        url: Url,
        connector: Arc<dyn Connector>,
        config: &ClientConfig,
        handlers: Handlers,
        closer: Closer,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        let handler = MessageHandler::new(handlers.on_data, handlers.on_latency, closer.token());
        Self {
            url,
            connector,
            reconnect: config.reconnect,
            socket_timeout: config.socket_timeout.min(MAX_DURATION),
            heartbeat_interval: config.heartbeat_interval.clamp(MIN_PERIOD, MAX_DURATION),
            on_open: handlers.on_open,
            handler,
            closer,
            status,
        }
    }

    /// Start the session on the current runtime.
    ///
    /// Fails with [`ClientError::Config`] when called outside a tokio runtime.
    pub fn spawn(self) -> Result<SessionHandle, ClientError> {
        let runtime = runtime_handle()?;
        let closer = self.closer.clone();
        let status = self.status.subscribe();
        let task = runtime.spawn(self.run());
        Ok(SessionHandle {
            closer,
            status,
            task,
        })
    }

    async fn run(mut self) {
        // The check timer exists from the start so a hanging connect is caught too.
        let period = self.heartbeat_interval;
        let now = Instant::now();
        let mut check = interval_at(now.checked_add(period).unwrap_or(now), period);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = Heartbeat::new(self.socket_timeout, Instant::now());
        let mut generation = 0;

        while let Some((mut sink, mut stream)) = self.establish(&mut check, &mut heartbeat).await {
            generation += 1;
            match self
                .serve(generation, &mut sink, &mut stream, &mut check, &mut heartbeat)
                .await
            {
                Outcome::Closed => {
                    if timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                        debug!("Close handshake on {} timed out", self.url);
                    }
                    break;
                }
                Outcome::Stale => {
                    // Dropping both halves forcibly closes the stale transport.
                    drop(sink);
                    drop(stream);
                    self.status.send_modify(|s| {
                        s.phase = Phase::Reconnecting;
                        s.transport_up = false;
                        s.reconnects += 1;
                    });
                }
            }
        }

        self.status.send_modify(|s| {
            s.phase = Phase::Closed;
            s.transport_up = false;
            s.healthy = false;
        });
        info!("Connection closed on {}", self.url);
    }

    /// Connect, retrying only when the heartbeat declares the attempt dead.
    ///
    /// Returns `None` once the caller closes the session.
    async fn establish(
        &mut self,
        check: &mut Interval,
        heartbeat: &mut Heartbeat,
    ) -> Option<(FrameSink, FrameStream)> {
        loop {
            heartbeat.reset(Instant::now());
            debug!("Connecting to {}", self.url);

            let connect = self.connector.connect(&self.url);
            tokio::pin!(connect);
            let mut pending = true;

            loop {
                tokio::select! {
                    biased;
                    _ = self.closer.token.cancelled() => return None,
                    result = &mut connect, if pending => {
                        pending = false;
                        match result {
                            Ok(transport) => return Some(transport),
                            // Absorbed; the heartbeat decides when to try again.
                            Err(e) => warn!("Connection error on {}: {}", self.url, e),
                        }
                    }
                    _ = check.tick() => {
                        if let Err(e) = heartbeat.check(Instant::now()) {
                            if self.reconnect {
                                warn!("Connection on {} timed out ({}), attempting reconnect", self.url, e);
                                self.status.send_modify(|s| {
                                    s.phase = Phase::Reconnecting;
                                    s.reconnects += 1;
                                });
                                break;
                            }
                            if heartbeat.report_stale() {
                                warn!("Connection on {} is stale ({}) and reconnect is disabled", self.url, e);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Drive one open transport until it is closed by the caller or goes stale.
    async fn serve(
        &mut self,
        generation: u64,
        sink: &mut FrameSink,
        stream: &mut FrameStream,
        check: &mut Interval,
        heartbeat: &mut Heartbeat,
    ) -> Outcome {
        info!("Connection opened on {}", self.url);

        // Replaces the defensive timer: first probe one period after open.
        check.reset();
        heartbeat.reset(Instant::now());

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
        self.status.send_modify(|s| {
            s.phase = Phase::Open;
            s.transport_up = true;
            s.healthy = true;
            s.generation = generation;
        });

        if !self.closer.is_closed() {
            let sender = Sender {
                tx: out_tx.clone(),
                generation,
            };
            (self.on_open)(sender, self.closer.clone());
        }

        let token = self.closer.token();
        let mut transport_up = true;
        // A stalled write must not hold up pongs, ticks or close for long.
        let send_limit = self.socket_timeout.min(self.heartbeat_interval);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Outcome::Closed,
                Some(frame) = out_rx.recv() => {
                    if let Err(e) = write_frame(sink, &frame, send_limit, &token).await {
                        warn!("Failed to send {} frame on {}: {}", frame.kind(), self.url, e);
                    }
                }
                incoming = stream.next(), if transport_up => match incoming {
                    Some(Ok(bytes)) => match self.handler.process_message(&bytes, heartbeat) {
                        Ok(Dispatched::Pong(latency)) => self.status.send_modify(|s| {
                            s.healthy = true;
                            if latency.is_some() {
                                s.latency = latency;
                            }
                        }),
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Discarding malformed frame on {}: {}", self.url, e);
                            self.status.send_modify(|s| s.framing_errors += 1);
                        }
                    },
                    Some(Err(e)) => warn!("Connection error on {}: {}", self.url, e),
                    None => {
                        info!("Transport closed by peer on {}", self.url);
                        transport_up = false;
                        self.status.send_modify(|s| s.transport_up = false);
                    }
                },
                _ = check.tick() => {
                    let now = Instant::now();
                    heartbeat.probe_sent(now);
                    if let Err(e) = write_frame(sink, &Frame::Ping, send_limit, &token).await {
                        debug!("Ping failed on {}: {}", self.url, e);
                    }

                    if let Err(e) = heartbeat.check(now) {
                        if self.reconnect {
                            warn!("Connection on {} timed out ({}), attempting reconnect", self.url, e);
                            return Outcome::Stale;
                        }
                        if heartbeat.report_stale() {
                            warn!("Connection on {} is stale ({}) and reconnect is disabled", self.url, e);
                            self.status.send_modify(|s| s.healthy = false);
                        }
                    }
                }
            }
        }
    }
}

/// Write one frame, abandoning it after `limit` or as soon as the session closes.
async fn write_frame(
    sink: &mut FrameSink,
    frame: &Frame,
    limit: Duration,
    token: &CancellationToken,
) -> Result<(), ClientError> {
    let bytes = codec::encode(frame)?;
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ClientError::Transport("session closed during send".to_string())),
        sent = timeout(limit, sink.send(bytes)) => match sent {
            Ok(result) => result,
            Err(_) => Err(ClientError::Transport(format!(
                "send did not complete within {:?}",
                limit
            ))),
        },
    }
}

pub(crate) fn runtime_handle() -> Result<tokio::runtime::Handle, ClientError> {
    tokio::runtime::Handle::try_current()
        .map_err(|_| ClientError::Config("streaming requires a running tokio runtime".to_string()))
}
