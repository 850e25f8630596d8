//! Minimal HTTP/1.1 server that answers batch POSTs from a script, for integration tests.
//!
//! Each request consumes the next scripted reply; once the script is empty
//! every request gets `200` with `{"results":[{"id":1}]}`. Request bodies are
//! recorded in arrival order. Connections are served concurrently, so a slow
//! reply does not hold back later requests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    /// Time the server holds the request before answering.
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: Vec::new(),
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn throttled(retry_after: Option<&str>) -> Self {
        Self {
            status: 429,
            reason: "Too Many Requests",
            headers: retry_after
                .map(|v| vec![("Retry-After", v.to_string())])
                .unwrap_or_default(),
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, reason: &'static str, body: &str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Default)]
pub struct BatchServer {
    script: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl BatchServer {
    /// Bodies of every request received so far.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }

    /// `received:<n>` and `answered:<n>` entries, in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

/// Starts a server in a background thread. Returns the endpoint URL and a
/// handle for inspecting requests. The server runs until the process exits.
pub fn start(script: Vec<Reply>) -> (String, BatchServer) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let server = BatchServer {
        script: Arc::new(Mutex::new(script.into())),
        requests: Arc::default(),
        events: Arc::default(),
    };
    let state = server.clone();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = state.clone();
            thread::spawn(move || handle(stream, &state));
        }
    });
    (format!("http://127.0.0.1:{}/_api/batch", port), server)
}

fn handle(mut stream: TcpStream, state: &BatchServer) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(body) = read_request_body(&mut stream) else {
        return;
    };
    let (n, reply) = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(body);
        let n = requests.len() - 1;
        state.events.lock().unwrap().push(format!("received:{}", n));
        let reply = state
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::ok(r#"{"results":[{"id":1}]}"#));
        (n, reply)
    };
    if !reply.delay.is_zero() {
        thread::sleep(reply.delay);
    }
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n",
        reply.status,
        reply.reason,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);
    // Logged before writing, so it precedes anything the client sends next.
    state.events.lock().unwrap().push(format!("answered:{}", n));
    let _ = stream.write_all(response.as_bytes());
}

/// Reads headers, then exactly `Content-Length` bytes of body.
fn read_request_body(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(n, _)| n.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(buf[header_end..].to_vec())
}
