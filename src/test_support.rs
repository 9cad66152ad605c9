//! Scripted HTTP/1.1 server standing in for the weather APIs in tests.

use crate::settings::Settings;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    delay: Duration,
}

impl MockResponse {
    pub(crate) fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
            delay: Duration::ZERO,
        }
    }

    /// JSON encoded as ISO-8859-15, as AEMET serves it.
    pub(crate) fn latin1_json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json;charset=ISO-8859-15",
            body: body.to_string().chars().map(|c| c as u32 as u8).collect(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/html",
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn csv(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/csv",
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// Holds the response back for `delay` after the request arrives.
    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Routes = HashMap<String, VecDeque<MockResponse>>;

/// Answers each path with its queued responses in order; the last one repeats.
pub(crate) struct MockServer {
    addr: SocketAddr,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<Routes>> = Arc::default();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();

        let (r, q) = (routes.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (r, q) = (r.clone(), q.clone());
                tokio::spawn(async move {
                    let _ = serve(stream, r, q).await;
                });
            }
        });

        Self {
            addr,
            routes,
            requests,
        }
    }

    pub(crate) fn route(&self, path: &str, responses: Vec<MockResponse>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), responses.into());
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Request targets (path and query) in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|target| target.split('?').next() == Some(path))
            .count()
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let path = target.split('?').next().unwrap_or("/").to_string();
    requests.lock().unwrap().push(target);

    let response = {
        let mut routes = routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    }
    .unwrap_or_else(|| MockResponse::text(404, "not found"));

    tokio::time::sleep(response.delay).await;
    let reason = reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        response.content_type,
        response.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.shutdown().await
}

/// Settings for tests: no pauses and a private cache directory.
pub(crate) fn test_settings(cache_dir: &Path) -> Settings {
    Settings::builder()
        .pause(Duration::ZERO)
        .error_pause(Duration::ZERO)
        .timeout(Duration::from_secs(10))
        .cache_dir(cache_dir.to_path_buf())
        .build()
}
