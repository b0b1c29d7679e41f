//! Integration tests for the `pactbroker serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Helper: start the broker on the given port, optionally backed by a data file.
fn start_server(port: u16, data_file: Option<&Path>) -> Child {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pactbroker"));
    cmd.arg("serve").arg("--port").arg(port.to_string());
    if let Some(path) = data_file {
        cmd.arg("--data-file").arg(path);
    }
    cmd.env_remove("PACTBROKER_BASE_URL")
        .env_remove("PACTBROKER_DATA_FILE")
        .env_remove("PACTBROKER_SHOW_WEBHOOK_RESPONSE");
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let child = cmd.spawn().expect("failed to start pactbroker serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return child;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    child
}

fn stop(mut child: Child) {
    child.kill().ok();
    child.wait().ok();
}

/// Helper: make an HTTP request and return (status, response_headers, body).
fn http_request(
    port: u16,
    method: &str,
    path: &str,
    body: Option<&Value>,
) -> (u16, String, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let body = body.map(Value::to_string).unwrap_or_default();
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        port,
        body.len(),
        body
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response_full(&response)
}

fn http_get(port: u16, path: &str) -> (u16, String) {
    let (status, _, body) = http_request(port, "GET", path, None);
    (status, body)
}

fn http_json(port: u16, method: &str, path: &str, body: Value) -> (u16, Value) {
    let (status, _, body) = http_request(port, method, path, Some(&body));
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Extract a header value from raw headers string.
fn extract_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    let name_lower = name.to_lowercase();
    for line in headers.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().to_lowercase() == name_lower {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Parse an HTTP response into (status_code, headers_string, body).
fn parse_http_response_full(response: &str) -> (u16, String, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status_line = headers.lines().next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = extract_header(&headers, "transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let body = if chunked { decode_chunked(&body) } else { body };

    (status, headers, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

#[test]
fn health_returns_200_with_version() {
    let port = next_port();
    let child = start_server(port, None);

    let (status, body) = http_get(port, "/health");
    stop(child);

    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("valid JSON");
    assert_eq!(json["status"], "ok");
    assert!(json.get("version").is_some(), "version field must be present");
}

#[test]
fn unknown_route_returns_404_json() {
    let port = next_port();
    let child = start_server(port, None);

    let (status, body) = http_get(port, "/no/such/thing");
    stop(child);

    assert_eq!(status, 404);
    let json: Value = serde_json::from_str(&body).expect("valid JSON");
    assert_eq!(json["error"], "not found");
}

#[test]
fn pacticipant_put_and_patch_over_http() {
    let port = next_port();
    let child = start_server(port, None);

    let (created, _) = http_json(
        port,
        "POST",
        "/pacticipants",
        json!({ "name": "Foo", "repositoryUrl": "http://foo", "mainBranch": "main" }),
    );
    let (replaced, after_put) = http_json(
        port,
        "PUT",
        "/pacticipants/Foo",
        json!({ "displayName": "Foo" }),
    );
    let (merged, after_patch) = http_json(
        port,
        "PATCH",
        "/pacticipants/Foo",
        json!({ "repositoryUrl": "http://bar" }),
    );
    let (missing, _) = http_json(port, "PUT", "/pacticipants/Bar", json!({}));
    stop(child);

    assert_eq!(created, 201);
    assert_eq!(replaced, 200);
    assert!(after_put["repositoryUrl"].is_null());
    assert!(after_put["mainBranch"].is_null());
    assert_eq!(merged, 200);
    assert_eq!(after_patch["displayName"], "Foo");
    assert_eq!(after_patch["repositoryUrl"], "http://bar");
    assert_eq!(missing, 404);
}

#[test]
fn verification_location_uses_request_host() {
    let port = next_port();
    let child = start_server(port, None);

    let pact = json!({
        "consumer": { "name": "Foo" },
        "provider": { "name": "Bar" },
        "interactions": [],
    });
    let (published, body) = http_json(
        port,
        "PUT",
        "/pacts/provider/Bar/consumer/Foo/version/1.0.0",
        pact,
    );
    let publish_url = body["_links"]["pb:publish-verification-results"]["href"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let path = publish_url
        .strip_prefix(&format!("http://localhost:{port}"))
        .unwrap_or_default()
        .to_string();
    let (status, headers, body) = http_request(
        port,
        "POST",
        &path,
        Some(&json!({ "success": true, "providerApplicationVersion": "2.0.0" })),
    );
    stop(child);

    assert_eq!(published, 201);
    assert!(path.contains("/metadata/"), "unexpected link: {publish_url}");
    assert_eq!(status, 201, "{body}");
    let location = extract_header(&headers, "location").expect("location header");
    assert!(location.starts_with(&format!("http://localhost:{port}/pacts/provider/Bar")));
    assert!(location.ends_with("/verification-results/1"));
    let json: Value = serde_json::from_str(&body).expect("valid JSON");
    assert_eq!(json["consumerVersionNumber"], "1.0.0");
}

#[test]
fn data_file_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_file = dir.path().join("broker.json");

    let port = next_port();
    let child = start_server(port, Some(&data_file));
    let (status, _) = http_json(
        port,
        "POST",
        "/environments",
        json!({ "name": "production", "production": true }),
    );
    stop(child);
    assert_eq!(status, 201);

    let port = next_port();
    let child = start_server(port, Some(&data_file));
    let (status, body) = http_get(port, "/environments/production");
    stop(child);

    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("valid JSON");
    assert_eq!(json["production"], true);
}
