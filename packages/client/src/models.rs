use std::fmt;

use serde::{Deserialize, Serialize};

/// One typed unit on the streaming wire.
///
/// Serialized as `{"type":"ping"}`, `{"type":"pong"}` or
/// `{"type":"data","data":...}` before compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Ping,
    Pong,
    Data { data: serde_json::Value },
    /// Any frame type this client does not understand.
    #[serde(other)]
    Unknown,
}

impl Frame {
    pub fn data(payload: impl Into<serde_json::Value>) -> Self {
        Frame::Data {
            data: payload.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::Data { .. } => "data",
            Frame::Unknown => "unknown",
        }
    }
}

/// Logical push streams exposed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Network,
    Blocks,
    Transactions,
    Accounts,
    Nodes,
    Search,
    Filter,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Network,
        Channel::Blocks,
        Channel::Transactions,
        Channel::Accounts,
        Channel::Nodes,
        Channel::Search,
        Channel::Filter,
    ];

    /// Path segment under `/<network>/`.
    pub fn path(&self) -> &'static str {
        match self {
            Channel::Network => "live/network",
            Channel::Blocks => "live/blocks",
            Channel::Transactions => "live/transactions",
            Channel::Accounts => "live/accounts",
            Channel::Nodes => "live/nodes",
            Channel::Search => "live/search",
            Channel::Filter => "live/filter",
        }
    }

    /// Whether the server expects a subscription key as the first message.
    pub fn is_scoped(&self) -> bool {
        !matches!(self, Channel::Network | Channel::Filter)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
