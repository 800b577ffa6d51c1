use anyhow::{bail, Context, Result};
use ethrex::config::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_ROOT, DEFAULT_SOCKET_TIMEOUT};
use ethrex::{ClientConfig, Network};
use std::env;
use std::time::Duration;

/// Settings read from the environment (and `.env`), before CLI flags apply.
#[derive(Debug, Clone)]
pub struct Config {
    pub apikey: String,
    pub network: Network,
    pub reconnect: bool,
    pub socket_timeout: u64,
    pub heartbeat_interval: u64,
    pub root: String,
    pub insecure: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let apikey = get("ETHREX_API_KEY").unwrap_or_default();

        let network = get("ETHREX_NETWORK")
            .map(|n| n.parse::<Network>())
            .transpose()
            .context("ETHREX_NETWORK must be homestead or morden")?
            .unwrap_or_default();

        let reconnect = match get("ETHREX_RECONNECT") {
            Some(value) => parse_flag(&value).context("ETHREX_RECONNECT must be true or false")?,
            None => true,
        };

        let socket_timeout = get("ETHREX_SOCKET_TIMEOUT")
            .unwrap_or_else(|| DEFAULT_SOCKET_TIMEOUT.as_millis().to_string())
            .parse()
            .context("ETHREX_SOCKET_TIMEOUT must be a valid number of milliseconds")?;

        let heartbeat_interval = get("ETHREX_HEARTBEAT_INTERVAL")
            .unwrap_or_else(|| DEFAULT_HEARTBEAT_INTERVAL.as_millis().to_string())
            .parse()
            .context("ETHREX_HEARTBEAT_INTERVAL must be a valid number of milliseconds")?;

        let root = get("ETHREX_ROOT").unwrap_or_else(|| DEFAULT_ROOT.to_string());

        let insecure = match get("ETHREX_INSECURE") {
            Some(value) => parse_flag(&value).context("ETHREX_INSECURE must be true or false")?,
            None => false,
        };

        Ok(Config {
            apikey,
            network,
            reconnect,
            socket_timeout,
            heartbeat_interval,
            root,
            insecure,
        })
    }

    /// Apply the `--network` flag, which wins over the environment.
    pub fn with_network(mut self, network: Option<Network>) -> Self {
        if let Some(network) = network {
            self.network = network;
        }
        self
    }

    pub fn client_config(&self, verbose: bool) -> ClientConfig {
        ClientConfig::new(self.network)
            .with_apikey(self.apikey.clone())
            .with_verbose(verbose)
            .with_reconnect(self.reconnect)
            .with_socket_timeout(Duration::from_millis(self.socket_timeout))
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_interval))
            .with_root(self.root.clone(), !self.insecure)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("'{}' is not a boolean", other),
    }
}
