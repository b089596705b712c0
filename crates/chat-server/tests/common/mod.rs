//! Shared harness for the end-to-end scenarios in §8: a real chatd
//! instance bound to an ephemeral port, driven by real `TcpStream`
//! clients speaking the wire protocol directly.

use chat_core::session::SessionRegistry;
use chat_core::store::Database;
use chatd::{AppState, Listener};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Starts a chatd instance against an in-memory database and returns the
/// address clients should connect to. The accept loop runs for the
/// lifetime of the test process; there is no shutdown path here, same as
/// a plain `tokio::test` process-per-test.
pub async fn spawn_server() -> SocketAddr {
    let db = Database::open_in_memory().expect("open in-memory db");
    let sessions = SessionRegistry::new(1000, Duration::from_secs(3600));
    let state = AppState::new(db, sessions);

    let listener = Listener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = SocketAddr::from(([127, 0, 0, 1], listener.port()));
    tokio::spawn(listener.accept_loop(state));
    addr
}

/// A single connected client, speaking CRLF-framed records directly.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
    token: Option<String>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self { stream, buf: Vec::new(), token: None }
    }

    /// Sends one record built from `verb req_id k=v ...`. If this client
    /// has a session token (set by [`Self::register_and_login`]) and the
    /// caller didn't already supply one, it is attached automatically —
    /// every verb but PING/REGISTER/LOGIN requires one, and threading it
    /// through every call site in every test would just be noise.
    pub async fn send(&mut self, verb: &str, req_id: &str, fields: &[(&str, &str)]) {
        let mut line = format!("{verb} {req_id}");
        let has_token = fields.iter().any(|(k, _)| *k == "token");
        if !has_token {
            if let Some(token) = &self.token {
                line.push_str(&format!(" token={token}"));
            }
        }
        for (k, v) in fields {
            line.push_str(&format!(" {k}={v}"));
        }
        line.push_str("\r\n");
        self.stream.write_all(line.as_bytes()).await.expect("write");
    }

    /// Reads the next CRLF-terminated record as a `String`, skipping
    /// nothing — callers must consume PUSH records themselves when the
    /// scenario interleaves pushes and responses.
    pub async fn recv(&mut self) -> String {
        loop {
            if let Some(at) = find_crlf(&self.buf) {
                let record: Vec<u8> = self.buf.drain(..at).collect();
                self.buf.drain(..2);
                return String::from_utf8(record).expect("utf8 record");
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.expect("read");
            assert!(n > 0, "connection closed before a full record arrived");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Convenience: register + login, returning the session token.
    pub async fn register_and_login(&mut self, username: &str, password: &str) -> String {
        self.send(
            "REGISTER",
            "1",
            &[("username", username), ("password", password), ("email", &format!("{username}@example.com"))],
        )
        .await;
        let resp = self.recv().await;
        assert!(resp.starts_with("OK"), "register failed: {resp}");

        self.send("LOGIN", "2", &[("username", username), ("password", password)]).await;
        let resp = self.recv().await;
        assert!(resp.starts_with("OK"), "login failed: {resp}");
        let token = field(&resp, "token").expect("token in login response").to_string();
        self.token = Some(token.clone());
        token
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Pulls `key=value` out of a response/push line for assertions.
pub fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_ascii_whitespace().find_map(|tok| {
        let (k, v) = tok.split_once('=')?;
        (k == key).then_some(v)
    })
}
