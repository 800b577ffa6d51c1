use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ClientError;
use crate::models::Frame;
use crate::websocket::codec;
use crate::websocket::heartbeat::Heartbeat;
use crate::websocket::session::{Closer, Sender};

/// Invoked for every inbound data payload.
pub type DataHandler = Box<dyn FnMut(Value) + Send>;
/// Invoked each time a transport becomes usable, with fresh `send`/`close`.
pub type OpenHandler = Box<dyn FnMut(Sender, Closer) + Send>;
/// Invoked for every latency measurement.
pub type LatencyHandler = Box<dyn FnMut(Duration) + Send>;

/// Caller callbacks for one session.
pub struct Handlers {
    pub on_data: DataHandler,
    pub on_open: OpenHandler,
    pub on_latency: LatencyHandler,
}

impl Handlers {
    pub fn new<D, O, L>(on_data: D, on_open: O, on_latency: L) -> Self
    where
        D: FnMut(Value) + Send + 'static,
        O: FnMut(Sender, Closer) + Send + 'static,
        L: FnMut(Duration) + Send + 'static,
    {
        Self {
            on_data: Box::new(on_data),
            on_open: Box::new(on_open),
            on_latency: Box::new(on_latency),
        }
    }
}

/// What an inbound frame turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Data,
    Pong(Option<Duration>),
    Ignored,
}

/// Decodes inbound frames and routes them to the heartbeat or the caller.
///
/// Callbacks are skipped once the session's token is cancelled, so nothing
/// reaches the caller after `close`.
pub struct MessageHandler {
    on_data: DataHandler,
    on_latency: LatencyHandler,
    token: CancellationToken,
}

impl MessageHandler {
    pub fn new(on_data: DataHandler, on_latency: LatencyHandler, token: CancellationToken) -> Self {
        Self {
            on_data,
            on_latency,
            token,
        }
    }

    /// Process one encoded inbound frame.
    pub fn process_message(
        &mut self,
        bytes: &[u8],
        heartbeat: &mut Heartbeat,
    ) -> Result<Dispatched, ClientError> {
        let frame = codec::decode(bytes)?;

        match frame {
            Frame::Pong => {
                let latency = heartbeat.ack(Instant::now());
                if let Some(latency) = latency {
                    debug!("Pong received, latency {:?}", latency);
                    if !self.token.is_cancelled() {
                        (self.on_latency)(latency);
                    }
                }
                Ok(Dispatched::Pong(latency))
            }
            Frame::Data { data } => {
                if self.token.is_cancelled() {
                    debug!("Dropping data frame for closed session");
                    return Ok(Dispatched::Ignored);
                }
                (self.on_data)(data);
                Ok(Dispatched::Data)
            }
            other => {
                debug!("Ignoring inbound {} frame", other.kind());
                Ok(Dispatched::Ignored)
            }
        }
    }
}
