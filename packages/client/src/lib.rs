//! Client for the ethrex blockchain API.
//!
//! Two paths to the service: a request/response HTTP call and push streams
//! over websockets. Every stream runs in its own resilient session that
//! pings the server, watches for pongs and rebuilds the transport when the
//! server goes quiet.
//!
//! ```no_run
//! # async fn demo() -> Result<(), ethrex::ClientError> {
//! let ethrex = ethrex::Ethrex::new(ethrex::ClientConfig::default())?;
//! let block = ethrex.block("latest").fetch().await?;
//! println!("{}", block);
//!
//! let sub = ethrex.block("latest").live(
//!     |update| println!("{}", update),
//!     |_send, _close| println!("subscribed"),
//!     |latency| println!("latency {:?}", latency),
//! )?;
//! sub.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod resources;
pub mod websocket;

use std::sync::Arc;

use tracing::{debug, info};

pub use config::{ClientConfig, Network};
pub use error::ClientError;
pub use http::HttpClient;
pub use models::{Channel, Frame};
pub use resources::{Account, Block, Filter, NetworkStatus, Node, Search, Solc, Transaction};
pub use websocket::{
    ChannelMultiplexer, Closer, Connector, Phase, Sender, SessionStatus, Subscription, WsConnector,
};

struct Inner {
    config: Arc<ClientConfig>,
    http: HttpClient,
    mux: ChannelMultiplexer,
}

/// Entry point: holds the static configuration and hands out resource handles.
///
/// Cheap to clone. Live subscriptions must be started inside a tokio runtime.
#[derive(Clone)]
pub struct Ethrex {
    inner: Arc<Inner>,
}

impl Ethrex {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = Arc::new(WsConnector::new(config.apikey.clone()));
        Self::with_connector(config, connector)
    }

    /// Build a client whose streams go through a custom transport.
    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let config = Arc::new(config);

        if config.verbose {
            info!(
                "Ethrex API initialized with network {} (root: {}, reconnect: {}, socket timeout: {:?}, heartbeat: {:?})",
                config.network, config.root, config.reconnect, config.socket_timeout, config.heartbeat_interval
            );
        } else {
            debug!("Ethrex API initialized with network {}", config.network);
        }

        let http = HttpClient::new(config.clone())?;
        let mux = ChannelMultiplexer::new(config.clone(), connector);
        Ok(Self {
            inner: Arc::new(Inner { config, http, mux }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.inner.http
    }

    pub fn multiplexer(&self) -> &ChannelMultiplexer {
        &self.inner.mux
    }

    pub fn network(&self) -> NetworkStatus {
        NetworkStatus::new(self)
    }

    pub fn block(&self, id: impl Into<String>) -> Block {
        Block::new(self, id.into())
    }

    pub fn transaction(&self, id: impl Into<String>) -> Transaction {
        Transaction::new(self, id.into())
    }

    pub fn account(&self, id: impl Into<String>) -> Account {
        Account::new(self, id.into())
    }

    pub fn node(&self, id: impl Into<String>) -> Node {
        Node::new(self, id.into())
    }

    pub fn search(&self) -> Search {
        Search::new(self)
    }

    pub fn filter(&self) -> Filter {
        Filter::new(self)
    }

    pub fn solc(&self) -> Solc {
        Solc::new(self)
    }

    /// Close every live subscription. Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        self.inner.mux.close_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = ClientConfig::default().with_root("wss://api.ethrex.io/v1", true);
        assert!(matches!(Ethrex::new(config), Err(ClientError::Config(_))));
    }

    #[test]
    fn config_is_shared_read_only() {
        let ethrex = Ethrex::new(ClientConfig::new(Network::Morden).with_apikey("k")).unwrap();
        let clone = ethrex.clone();
        assert_eq!(clone.config().network, Network::Morden);
        assert_eq!(clone.config().apikey, "k");
        assert!(clone.multiplexer().active().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn info_log_of(config: ClientConfig) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || Ethrex::new(config).unwrap());
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn verbose_controls_the_init_message() {
        let quiet = info_log_of(ClientConfig::default());
        assert!(!quiet.contains("initialized"));

        let verbose = info_log_of(ClientConfig::default().with_verbose(true));
        assert!(verbose.contains("Ethrex API initialized with network homestead"));
        assert!(verbose.contains("api.ethrex.io/v1"));
    }

    #[test]
    fn oversized_heartbeat_is_rejected_at_construction() {
        let config = ClientConfig::default().with_heartbeat_interval(Duration::MAX);
        assert!(matches!(Ethrex::new(config), Err(ClientError::Config(_))));
    }
}
