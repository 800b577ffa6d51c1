//! In-memory transports for exercising sessions under paused time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};
use url::Url;

use crate::error::ClientError;
use crate::models::Frame;
use crate::websocket::codec;
use crate::websocket::connection::{Connector, FrameSink, FrameStream};

type Inbound = Result<Vec<u8>, ClientError>;

/// Connector whose every attempt yields a fresh in-memory peer.
pub(crate) struct MockConnector {
    peers: UnboundedSender<MockPeer>,
    attempts: Mutex<Vec<(Instant, Url)>>,
    fail: AtomicUsize,
    hang: AtomicUsize,
    stall: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            attempts: Mutex::new(Vec::new()),
            fail: AtomicUsize::new(0),
            hang: AtomicUsize::new(0),
            stall: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Refuse the next `n` attempts.
    pub fn fail_next(&self, n: usize) {
        self.fail.store(n, Ordering::SeqCst);
    }

    /// Never complete the next `n` attempts.
    pub fn hang_next(&self, n: usize) {
        self.hang.store(n, Ordering::SeqCst);
    }

    /// The next `n` transports accept sends that never complete.
    pub fn stall_sends_next(&self, n: usize) {
        self.stall.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.attempts.lock().unwrap().iter().map(|(_, url)| url.clone()).collect()
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), ClientError> {
        self.attempts.lock().unwrap().push((Instant::now(), url.clone()));

        if take(&self.hang) {
            std::future::pending::<()>().await;
        }
        if take(&self.fail) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }

        let stalled = take(&self.stall);
        let (client_tx, peer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (peer_tx, client_rx) = mpsc::unbounded_channel::<Inbound>();

        let sink = futures_util::sink::unfold(client_tx, move |tx, bytes: Vec<u8>| async move {
            if stalled {
                std::future::pending::<()>().await;
            }
            tx.send(bytes)
                .map_err(|_| ClientError::Transport("peer went away".to_string()))?;
            Ok::<_, ClientError>(tx)
        });
        let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let _ = self.peers.send(MockPeer {
            rx: peer_rx,
            tx: peer_tx,
        });
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Server side of one in-memory transport. Dropping it closes the transport.
pub(crate) struct MockPeer {
    rx: UnboundedReceiver<Vec<u8>>,
    tx: UnboundedSender<Inbound>,
}

impl MockPeer {
    pub fn push(&self, frame: Frame) {
        let _ = self.tx.send(Ok(codec::encode(&frame).unwrap()));
    }
}

#[derive(Default)]
struct LogState {
    frames: Vec<Frame>,
    pings: usize,
    last_pong: Option<Instant>,
}

/// What an auto-responding peer has seen, plus a way to push to the client.
#[derive(Clone)]
pub(crate) struct PeerLog {
    state: Arc<Mutex<LogState>>,
    tx: UnboundedSender<Inbound>,
}

impl PeerLog {
    /// Non-ping frames received from the client, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock().unwrap().frames.clone()
    }

    pub fn pings(&self) -> usize {
        self.state.lock().unwrap().pings
    }

    pub fn last_pong(&self) -> Option<Instant> {
        self.state.lock().unwrap().last_pong
    }

    pub fn push_to_client(&self, frame: Frame) {
        let _ = self.tx.send(Ok(codec::encode(&frame).unwrap()));
    }

    pub fn push_raw(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(Ok(bytes));
    }
}

/// Answer pings with pongs, going quiet once `silent_after` has elapsed.
pub(crate) fn respond(peer: MockPeer, silent_after: Option<Duration>) -> PeerLog {
    let state = Arc::new(Mutex::new(LogState::default()));
    let log = PeerLog {
        state: state.clone(),
        tx: peer.tx.clone(),
    };
    let started = Instant::now();

    tokio::spawn(async move {
        let MockPeer { mut rx, tx } = peer;
        while let Some(bytes) = rx.recv().await {
            let Ok(frame) = codec::decode(&bytes) else {
                continue;
            };
            match frame {
                Frame::Ping => {
                    let silent = silent_after.is_some_and(|after| started.elapsed() >= after);
                    let mut state = state.lock().unwrap();
                    state.pings += 1;
                    if !silent {
                        state.last_pong = Some(Instant::now());
                        let _ = tx.send(Ok(codec::encode(&Frame::Pong).unwrap()));
                    }
                }
                other => state.lock().unwrap().frames.push(other),
            }
        }
    });

    log
}
