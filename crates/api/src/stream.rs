// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-ping stream over a long-lived websocket.
//!
//! The server pushes typed frames; the stream ends on server close or
//! error and is not restartable — reconnecting produces a new stream.

use crate::error::ApiError;
use futures_util::StreamExt;
use navvy_core::Job;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// One item from the push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Resume,
    Pause { reason: String },
    Disconnect { reason: String },
    JobAssigned { job: Job },
}

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Frame {
    Resume,
    Pause {
        #[serde(default)]
        reason: String,
    },
    Disconnect {
        #[serde(default)]
        reason: String,
    },
    JobAssigned {
        job: Job,
    },
}

/// A connected push-ping stream.
pub struct PingStream {
    inner: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

/// Derive the websocket URL for an agent's ping stream from the REST
/// endpoint (`https://…` becomes `wss://…`).
pub(crate) fn stream_url(endpoint: &str, agent_uuid: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ApiError::malformed("stream-pings", e))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    // Url::set_scheme rejects some cross-scheme changes; rebuild instead.
    let rebuilt = format!(
        "{}://{}{}{}/agents/{}/pings/stream",
        scheme,
        url.host_str().unwrap_or("localhost"),
        url.port().map(|p| format!(":{}", p)).unwrap_or_default(),
        url.path().trim_end_matches('/'),
        agent_uuid,
    );
    url = Url::parse(&rebuilt).map_err(|e| ApiError::malformed("stream-pings", e))?;
    Ok(url)
}

impl PingStream {
    /// Open the stream. Terminal errors here are connection-level; the
    /// caller classifies them via the usual rules.
    pub async fn connect(endpoint: &str, agent_uuid: &str, token: &str) -> Result<Self, ApiError> {
        let url = stream_url(endpoint, agent_uuid)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ApiError::transport("stream-pings", e))?;
        let auth = HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|e| ApiError::malformed("stream-pings", e))?;
        request.headers_mut().insert("Authorization", auth);

        let (inner, _) = connect_async(request)
            .await
            .map_err(|e| ApiError::transport("stream-pings", e))?;
        Ok(Self { inner })
    }

    /// Next event. `None` means the server closed the stream cleanly;
    /// an `Err` breaks the stream (the caller reconnects or falls back).
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, ApiError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(parse_frame(&text)),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Binary(_)) => continue,
                Ok(_) => continue,
                Err(e) => return Some(Err(ApiError::transport("stream-pings", e))),
            }
        }
    }
}

fn parse_frame(text: &str) -> Result<StreamEvent, ApiError> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| ApiError::malformed("stream-pings", e))?;
    Ok(match frame {
        Frame::Resume => StreamEvent::Resume,
        Frame::Pause { reason } => StreamEvent::Pause { reason },
        Frame::Disconnect { reason } => StreamEvent::Disconnect { reason },
        Frame::JobAssigned { job } => StreamEvent::JobAssigned { job },
    })
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
