//! End-to-end coverage of the scenarios in SPEC_FULL.md §8: a real
//! `Reactor` bound to an ephemeral port, driven over actual TCP sockets.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use httpd_core::{CredentialCache, CredentialPool, InMemoryCredentialPool, Reactor, ServerConfig};

fn write_page(dir: &tempfile::TempDir, name: &str, contents: &str) {
    std::fs::write(dir.path().join(name), contents).unwrap();
}

fn spawn_server(root: &std::path::Path, seed: HashMap<String, String>) -> std::net::SocketAddr {
    let config = ServerConfig {
        port: 0,
        document_root: root.to_path_buf(),
        idle_timeout: Duration::from_secs(1),
        ..ServerConfig::default()
    };
    let store: Arc<dyn CredentialPool> = Arc::new(InMemoryCredentialPool::new(seed));
    let credentials = CredentialCache::load(store.as_ref()).unwrap();
    let mut reactor = Reactor::new(config, credentials, store).unwrap();
    let addr = reactor.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = reactor.run();
    });
    // Give the reactor thread a moment to enter its poll loop.
    std::thread::sleep(Duration::from_millis(50));
    addr
}

fn roundtrip(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    stream.shutdown(std::net::Shutdown::Write).ok();
    let mut response = String::new();
    stream.read_to_string(&mut response).ok();
    response
}

/// Read exactly one HTTP response off `stream`: headers up to the blank
/// line, then `Content-Length` body bytes. Leaves the connection open for
/// a subsequent request, unlike `roundtrip`.
fn read_one_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    let header_end = loop {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before a full response arrived");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length: usize = header_text
        .lines()
        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before the full body arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf[..header_end + content_length]).to_string()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[test]
fn simple_get_serves_judge_html() {
    let dir = tempfile::tempdir().unwrap();
    write_page(&dir, "judge.html", "hello judge");
    let addr = spawn_server(dir.path(), HashMap::new());

    let resp = roundtrip(addr, "GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 200 OK"), "{resp}");
    assert!(resp.ends_with("hello judge"), "{resp}");
}

#[test]
fn missing_file_is_404_with_canned_body() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path(), HashMap::new());

    let resp = roundtrip(
        addr,
        "GET /nonexistent HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    assert!(resp.starts_with("HTTP/1.1 404"), "{resp}");
}

#[test]
fn unsupported_method_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path(), HashMap::new());

    let resp = roundtrip(addr, "PUT / HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 404"), "{resp}");
}

#[test]
fn login_success_serves_welcome_page() {
    let dir = tempfile::tempdir().unwrap();
    write_page(&dir, "welcome.html", "welcome alice");
    let mut seed = HashMap::new();
    seed.insert("alice".to_string(), "pw".to_string());
    let addr = spawn_server(dir.path(), seed);

    let body = "user=alice&password=pw";
    let req = format!(
        "POST /2CGISQL.cgi HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let resp = roundtrip(addr, &req);
    assert!(resp.starts_with("HTTP/1.1 200 OK"), "{resp}");
    assert!(resp.ends_with("welcome alice"), "{resp}");
}

#[test]
fn login_failure_serves_log_error_page() {
    let dir = tempfile::tempdir().unwrap();
    write_page(&dir, "logError.html", "bad credentials");
    let mut seed = HashMap::new();
    seed.insert("alice".to_string(), "pw".to_string());
    let addr = spawn_server(dir.path(), seed);

    let body = "user=alice&password=wrong";
    let req = format!(
        "POST /2CGISQL.cgi HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let resp = roundtrip(addr, &req);
    assert!(resp.ends_with("bad credentials"), "{resp}");
}

#[test]
fn keep_alive_serves_two_requests_on_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    write_page(&dir, "a.html", "first");
    write_page(&dir, "b.html", "second");
    let addr = spawn_server(dir.path(), HashMap::new());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
        .write_all(b"GET /a.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();

    let first = read_one_response(&mut stream);
    assert!(first.starts_with("HTTP/1.1 200 OK"));
    assert!(first.ends_with("first"));

    stream
        .write_all(b"GET /b.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let second = read_one_response(&mut stream);
    assert!(second.ends_with("second"), "{second}");
}
