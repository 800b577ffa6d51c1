use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::Channel;

/// Outbound half of a physical transport, carrying encoded frames.
pub type FrameSink = Pin<Box<dyn Sink<Vec<u8>, Error = ClientError> + Send>>;
/// Inbound half of a physical transport, yielding encoded frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ClientError>> + Send>>;

/// Opens physical transports for a session.
///
/// Every call must produce a brand-new transport; sessions never reuse one
/// across reconnects.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), ClientError>;
}

/// Websocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    apikey: String,
}

impl WsConnector {
    pub fn new(apikey: impl Into<String>) -> Self {
        Self {
            apikey: apikey.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), ClientError> {
        let mut request = url.as_str().into_client_request()?;
        if !self.apikey.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.apikey))
                .map_err(|e| ClientError::Config(format!("invalid API key: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, response) = connect_async(request).await?;
        debug!("WebSocket connected to {} with status: {}", url, response.status());

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(ClientError::from)
            .with(|bytes: Vec<u8>| future::ready(Ok::<_, ClientError>(Message::Binary(bytes))));

        let stream = read.filter_map(|message| async move {
            match message {
                Ok(Message::Binary(bytes)) => Some(Ok(bytes)),
                // Not expected from the service; let the codec reject it.
                Ok(Message::Text(text)) => Some(Ok(text.into_bytes())),
                Ok(Message::Close(frame)) => {
                    debug!("Received close frame: {:?}", frame);
                    None
                }
                // Transport-level ping/pong is answered by tungstenite itself.
                Ok(_) => None,
                Err(e) => Some(Err(ClientError::from(e))),
            }
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Streaming address for a channel: `wss://<root>/<network>/<channel>`.
pub fn channel_url(config: &ClientConfig, channel: Channel) -> Result<Url, ClientError> {
    endpoint_url(config, config.ws_scheme(), channel.path())
}

/// Request/response address for a resource path: `https://<root>/<network>/<path>`.
pub fn api_url(config: &ClientConfig, path: &str) -> Result<Url, ClientError> {
    endpoint_url(config, config.http_scheme(), path)
}

fn endpoint_url(config: &ClientConfig, scheme: &str, path: &str) -> Result<Url, ClientError> {
    let url = Url::parse(&format!(
        "{}://{}/{}/{}",
        scheme,
        config.root.trim_matches('/'),
        config.network,
        path.trim_start_matches('/')
    ))?;
    validate_url(&url)?;
    Ok(url)
}

fn validate_url(url: &Url) -> Result<(), ClientError> {
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => {}
        scheme => {
            return Err(ClientError::Config(format!(
                "Invalid scheme: {}, must be one of ws, wss, http, https",
                scheme
            )))
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| ClientError::Config(format!("URL is missing host: {}", url)))?;

    if !host.contains('.') && host != "localhost" {
        warn!("Host '{}' doesn't look like a valid hostname or IP address", host);
    }

    Ok(())
}
