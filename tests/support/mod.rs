#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docrank::config::{DatasetSettings, ModelSettings, ServerSettings};
use docrank::engine::Engine;
use docrank::http::{AppState, build_router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const HEADER: &str = "NPI,Login Time,Logout Time,Count of Survey Attempts";

/// Two days of sessions across every time category.
pub fn sample_rows() -> Vec<String> {
    let mut rows = Vec::new();
    let logins = [
        ("01:10", "03:00"),
        ("04:30", "06:00"),
        ("07:15", "09:00"),
        ("08:05", "12:30"),
        ("09:40", "11:00"),
        ("10:20", "13:00"),
        ("12:30", "15:00"),
        ("14:00", "16:45"),
        ("16:10", "18:00"),
        ("18:30", "21:00"),
        ("20:00", "22:15"),
        ("22:45", "23:50"),
    ];
    for day in 1..=2 {
        for (idx, (login, logout)) in logins.iter().enumerate() {
            let npi = 1_000_000_000 + day * 100 + idx;
            let attempts = (idx * 3 + day) % 7;
            rows.push(format!(
                "{npi},2024-03-0{day} {login}:00,2024-03-0{day} {logout}:00,{attempts}"
            ));
        }
    }
    rows
}

pub fn write_sessions_csv(dir: &Path, rows: &[String]) -> PathBuf {
    let path = dir.join("sessions.csv");
    let mut text = String::from(HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    std::fs::write(&path, text).expect("write sessions csv");
    path
}

pub fn quick_engine(path: PathBuf) -> Arc<Engine> {
    Arc::new(Engine::new(
        DatasetSettings { path, sheet: None },
        ModelSettings {
            rounds: 10,
            threads: 1,
            ..ModelSettings::default()
        },
    ))
}

/// Serve `engine` on an ephemeral port.
pub async fn spawn_server(engine: Arc<Engine>, settings: ServerSettings) -> SocketAddr {
    let app = build_router(AppState::new(engine, settings));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    addr
}

pub async fn send_raw(addr: SocketAddr, method: &str, path: &str) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("status");
    (status, head.to_string(), body.to_string())
}

pub async fn get_json(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
    let (status, _, body) = send_raw(addr, "GET", path).await;
    let json = serde_json::from_str(&body).expect("json body");
    (status, json)
}
