pub mod codec;
pub mod connection;
pub mod heartbeat;
pub mod message_handler;
pub mod multiplexer;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

// Re-export public interfaces
pub use connection::{channel_url, Connector, FrameSink, FrameStream, WsConnector};
pub use message_handler::Handlers;
pub use multiplexer::{ChannelMultiplexer, Route, Subscription};
pub use session::{Closer, Phase, Sender, Session, SessionHandle, SessionStatus};
