// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted HTTP/1.1 server for exercising the real client.
//!
//! Serves a fixed queue of canned responses, one per connection, and
//! journals every request it saw. Content-Length framing only.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// One scripted response.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl CannedResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into(), headers: Vec::new() }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What one request looked like on the wire.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RequestRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == wanted)
            .map(|(_, v)| v.as_str())
    }
}

/// A listening scripted server. Dropped-out responses default to
/// `200 {}` so incidental requests don't wedge a test.
pub struct ScriptedServer {
    addr: SocketAddr,
    responses: Arc<Mutex<VecDeque<CannedResponse>>>,
    requests: Arc<Mutex<Vec<RequestRecord>>>,
}

impl ScriptedServer {
    pub async fn start(script: Vec<CannedResponse>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let responses = Arc::new(Mutex::new(script.into_iter().collect::<VecDeque<_>>()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let responses_bg = Arc::clone(&responses);
        let requests_bg = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let response = responses_bg
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| CannedResponse::new(200, "{}"));
                let requests = Arc::clone(&requests_bg);
                tokio::spawn(async move {
                    let _ = serve_one(stream, response, requests).await;
                });
            }
        });

        Ok(Self { addr, responses, requests })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Append a response to the script. Useful when a response body
    /// needs the server's own URL (registration redirects).
    pub fn push(&self, response: CannedResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().clone()
    }

    /// "METHOD /path" per request, in arrival order.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().len()
    }
}

async fn serve_one(
    mut stream: TcpStream,
    response: CannedResponse,
    requests: Arc<Mutex<Vec<RequestRecord>>>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    // Headers, tracking Content-Length for the body read.
    let mut headers = Vec::new();
    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.trim_end().split_once(':') {
            let name = name.trim().to_string();
            let value = value.trim().to_string();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            headers.push((name, value));
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await?;
    }

    requests.lock().push(RequestRecord {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.body.len(),
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    write_half.write_all(head.as_bytes()).await?;
    write_half.write_all(response.body.as_bytes()).await?;
    write_half.flush().await?;
    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        423 => "Locked",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
