use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::websocket::connection::api_url;

/// Stateless request/response path to the API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpClient {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ethrex-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Call `path` under the configured network.
    ///
    /// Sends `POST` when a body is given, `GET` otherwise. A 404 maps to
    /// `NotFound` and any other non-200 status to `Protocol`, both carrying
    /// the body's `error` field.
    pub async fn call(
        &self,
        path: &str,
        params: &[(&str, String)],
        body: Option<String>,
    ) -> Result<Value, ClientError> {
        let url = api_url(&self.config, path)?;
        let method = if body.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        info!("{} {} with params {:?}", method, url, params);

        let mut request = self.client.request(method, url.clone());
        if !params.is_empty() {
            request = request.query(params);
        }
        if !self.config.apikey.is_empty() {
            request = request.bearer_auth(&self.config.apikey);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("{} responded {} ({} bytes)", url, status, text.len());

        match status {
            StatusCode::OK => Ok(serde_json::from_str(&text)?),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(error_message(&text))),
            status => Err(ClientError::Protocol {
                status: status.as_u16(),
                message: error_message(&text),
            }),
        }
    }
}

/// The `error` field of an error body, or the raw body if it has none.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => body.trim().to_string(),
        },
        _ => body.trim().to_string(),
    }
}

/// Fan a call result out to success/error callbacks.
///
/// A 404 calls `on_success(Value::Null)` and then `on_error` with the
/// server's message.
pub fn deliver<S, E>(result: Result<Value, ClientError>, on_success: S, on_error: E)
where
    S: FnOnce(Value),
    E: FnOnce(String),
{
    match result {
        Ok(value) => on_success(value),
        Err(ClientError::NotFound(message)) => {
            on_success(Value::Null);
            on_error(message);
        }
        Err(e) => on_error(e.callback_message()),
    }
}
