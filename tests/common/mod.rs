#![allow(dead_code)]

use bedrock_fleet_lib::instance::{
    ALLOWLIST_FILE, EXECUTABLE_NAME, PERMISSIONS_FILE, PROPERTIES_FILE,
};
use bedrock_fleet_lib::marker::MARKER_FILE;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use zip::write::SimpleFileOptions;

#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    /// Send `body`, advertise a larger length, then hold the connection open
    pub stall: bool,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            stall: false,
        }
    }

    pub fn stalling(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            stall: true,
        }
    }
}

/// Minimal HTTP/1.1 server serving fixed routes
pub struct HttpFixture {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl HttpFixture {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();

        let (task_routes, task_hits) = (routes.clone(), hits.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = task_routes.clone();
                let hits = task_hits.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, routes, hits).await;
                });
            }
        });

        Self { addr, routes, hits }
    }

    pub fn route(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
    let route = routes.lock().unwrap().get(&path).cloned();

    let Some(route) = route else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return stream.flush().await;
    };

    let advertised = if route.stall {
        route.body.len() * 10
    } else {
        route.body.len()
    };
    let header = format!(
        "HTTP/1.1 {} OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        route.status, advertised
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&route.body).await?;
    stream.flush().await?;

    if route.stall {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    Ok(())
}

/// Links API payload pointing at `download_url`
pub fn links_body(download_type: &str, download_url: &str) -> Vec<u8> {
    serde_json::json!({
        "result": {
            "links": [
                {
                    "downloadType": "serverBedrockLinux",
                    "downloadUrl": "https://example.invalid/other.zip"
                },
                { "downloadType": download_type, "downloadUrl": download_url }
            ]
        }
    })
    .to_string()
    .into_bytes()
}

/// Release archive as shipped upstream, default configs included
pub fn release_zip() -> Vec<u8> {
    build_zip(&[
        (EXECUTABLE_NAME, "new build"),
        (PROPERTIES_FILE, "server-name=Dedicated Server\n"),
        (ALLOWLIST_FILE, "[]"),
        (PERMISSIONS_FILE, "[]"),
        ("behavior_packs/vanilla/manifest.json", "{}"),
    ])
}

pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Complete instance directory with tuned configs
pub fn write_instance(dir: &Path, version: Option<&str>) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(EXECUTABLE_NAME), b"old build").unwrap();
    std::fs::write(
        dir.join(PROPERTIES_FILE),
        format!("server-name={}\ngamemode=survival\n", dir.display()),
    )
    .unwrap();
    std::fs::write(dir.join(ALLOWLIST_FILE), r#"[{"name":"alex"}]"#).unwrap();
    std::fs::write(dir.join(PERMISSIONS_FILE), r#"[{"permission":"member"}]"#).unwrap();
    if let Some(version) = version {
        std::fs::write(
            dir.join(MARKER_FILE),
            format!(r#"{{"Version":"{}"}}"#, version),
        )
        .unwrap();
    }
}

