use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default API root, without scheme.
pub const DEFAULT_ROOT: &str = "api.ethrex.io/v1";
/// Default liveness timeout for streaming sessions.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default period of the heartbeat check.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1_000);
/// Upper bound for the socket timeout and heartbeat interval.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Networks served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Homestead,
    Morden,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Homestead => "homestead",
            Network::Morden => "morden",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "homestead" => Ok(Network::Homestead),
            "morden" => Ok(Network::Morden),
            other => Err(ClientError::Config(format!(
                "unknown network '{}', expected homestead or morden",
                other
            ))),
        }
    }
}

/// Static client configuration, fixed at client construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer credential attached to every request.
    pub apikey: String,
    pub network: Network,
    /// Log construction details at `info` instead of `debug`.
    pub verbose: bool,
    /// Rebuild a streaming session when its heartbeat times out.
    pub reconnect: bool,
    /// How long a session may go without a pong before it is considered dead.
    pub socket_timeout: Duration,
    /// Period of the heartbeat check (ping + staleness test).
    pub heartbeat_interval: Duration,
    /// API host and base path, e.g. `api.ethrex.io/v1`.
    pub root: String,
    /// Use `https`/`wss`; `false` selects `http`/`ws` for local endpoints.
    pub secure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            apikey: String::new(),
            network: Network::default(),
            verbose: false,
            reconnect: true,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            root: DEFAULT_ROOT.to_string(),
            secure: true,
        }
    }
}

impl ClientConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn with_apikey(mut self, apikey: impl Into<String>) -> Self {
        self.apikey = apikey.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Point the client at another API root, e.g. a local test server.
    pub fn with_root(mut self, root: impl Into<String>, secure: bool) -> Self {
        self.root = root.into();
        self.secure = secure;
        self
    }

    pub fn http_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Reject configurations the transport cannot run with.
    pub fn validate(&self) -> Result<(), ClientError> {
        let root = self.root.trim_matches('/');
        if root.is_empty() {
            return Err(ClientError::Config("API root must not be empty".to_string()));
        }
        if root.contains("://") {
            return Err(ClientError::Config(format!(
                "API root '{}' must not include a scheme",
                self.root
            )));
        }
        check_duration("socket timeout", self.socket_timeout)?;
        check_duration("heartbeat interval", self.heartbeat_interval)?;
        Ok(())
    }
}

fn check_duration(name: &str, value: Duration) -> Result<(), ClientError> {
    if value.is_zero() {
        return Err(ClientError::Config(format!("{} must be positive", name)));
    }
    if value > MAX_DURATION {
        return Err(ClientError::Config(format!(
            "{} of {:?} exceeds the maximum of {:?}",
            name, value, MAX_DURATION
        )));
    }
    Ok(())
}
