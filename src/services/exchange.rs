//! Remote exchange for marksync.
//!
//! One exchange uploads the current tree with the last sync token and gets
//! back the server's authoritative tree. Only the outcome matters to the
//! coordinator: a reply, a temporary error (retry later) or a permanent
//! error (user must fix the login).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::types::bookmark::BookmarkModel;
use crate::types::credential::Credentials;
use crate::types::errors::ExchangeError;
use crate::types::serial::{self, SerialTree};
use crate::types::settings::RemoteSettings;

/// Everything a worker needs for one round trip. Owned so the worker never
/// touches the coordinator's trees.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub credentials: Credentials,
    pub client_id: Uuid,
    pub token: i64,
    pub tree: BookmarkModel,
}

/// The server's tree; its root carries the new sync token.
#[derive(Debug, Clone)]
pub struct ExchangeReply {
    pub tree: BookmarkModel,
}

impl ExchangeReply {
    pub fn token(&self) -> i64 {
        self.tree.seq_no()
    }
}

pub type ExchangeFuture = Pin<Box<dyn Future<Output = Result<ExchangeReply, ExchangeError>> + Send>>;

/// A remote bookmark server.
pub trait RemoteExchange: Send + Sync {
    fn exchange(&self, request: ExchangeRequest) -> ExchangeFuture;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    client_id: Uuid,
    token: i64,
    tree: &'a SerialTree,
}

#[derive(Deserialize)]
struct WireReply {
    tree: SerialTree,
}

/// JSON over HTTPS with Basic authentication.
pub struct HttpExchange {
    client: Client,
    url: String,
}

impl HttpExchange {
    pub fn new(settings: &RemoteSettings) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.request_timeout())
            .build()
            .map_err(|e| ExchangeError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            url: settings.server_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RemoteExchange for HttpExchange {
    fn exchange(&self, request: ExchangeRequest) -> ExchangeFuture {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let serial = serial::to_serial(&request.tree);
            let body = serde_json::to_vec(&WireRequest {
                client_id: request.client_id,
                token: request.token,
                tree: &serial,
            })
            .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;

            debug!(%url, token = request.token, bytes = body.len(), "sending exchange");
            let response = client
                .post(&url)
                .basic_auth(&request.credentials.username, Some(&request.credentials.password))
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(classify_transport)?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                return Err(classify_status(
                    status.as_u16(),
                    retry_after,
                    &request.credentials.username,
                ));
            }

            let bytes = response.bytes().await.map_err(classify_transport)?;
            let reply: WireReply = serde_json::from_slice(&bytes)
                .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;
            Ok(ExchangeReply {
                tree: serial::from_serial(&reply.tree),
            })
        })
    }
}

/// Maps a non-success HTTP status to an exchange error.
pub fn classify_status(code: u16, retry_after: Option<Duration>, username: &str) -> ExchangeError {
    match code {
        401 | 403 => ExchangeError::BadCredentials,
        404 => ExchangeError::UnknownAccount(username.to_string()),
        429 | 503 => ExchangeError::ServerWait(retry_after),
        _ => ExchangeError::HttpStatus(code),
    }
}

/// `Retry-After` in its delta-seconds form; HTTP dates are not honoured.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn classify_transport(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        return ExchangeError::Socket("request timed out".to_string());
    }
    let chain = error_chain(&err);
    if err.is_connect() {
        if chain.contains("dns error") || chain.contains("failed to lookup address") {
            return ExchangeError::NameResolution(chain);
        }
        return ExchangeError::Connect(chain);
    }
    if err.is_decode() || err.is_body() {
        return ExchangeError::MalformedResponse(chain);
    }
    ExchangeError::Socket(chain)
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
