// Shared mock Lambda Runtime API for the integration tests.
//
// Speaks just enough HTTP/1.1 to exercise the runtime over a single
// persistent connection: Content-Length bodies for the buffered path
// and chunked bodies with trailers for the streaming path. Every
// request the runtime makes is recorded for the tests to assert on.

// Each integration binary compiles its own copy and uses a subset.
#![allow(dead_code)]

use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One request observed by the mock server.
#[derive(Debug, Default, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    /// Content-Length body (buffered requests).
    pub body: Vec<u8>,
    /// Chunked body pieces, one entry per non-empty chunk.
    pub chunks: Vec<Vec<u8>>,
    /// Trailer block of a chunked request; empty on normal completion.
    pub trailers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An event the mock serves from the next-invocation endpoint.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub request_id: String,
    pub body: String,
    pub extra_headers: Vec<(String, String)>,
}

pub fn event(request_id: &str, body: &str) -> EventSpec {
    EventSpec {
        request_id: request_id.to_string(),
        body: body.to_string(),
        extra_headers: Vec::new(),
    }
}

pub fn event_with_trace(request_id: &str, body: &str, trace: &str) -> EventSpec {
    EventSpec {
        request_id: request_id.to_string(),
        body: body.to_string(),
        extra_headers: vec![("Lambda-Runtime-Trace-Id".to_string(), trace.to_string())],
    }
}

/// Starts a mock Runtime API serving `events` from the next endpoint
/// and answering each report POST with the next status from
/// `report_statuses` (202 once the list runs dry). Returns the bound
/// address, the request log, and the server thread handle.
pub fn spawn_mock_api(
    events: Vec<EventSpec>,
    report_statuses: Vec<u16>,
) -> (String, Arc<Mutex<Vec<RecordedRequest>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind mock server");
    let addr = listener.local_addr().unwrap().to_string();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    let handle = thread::spawn(move || {
        let (stream, _) = match listener.accept() {
            Ok(conn) => conn,
            Err(_) => return,
        };
        // Fail hung tests quickly instead of blocking the suite.
        let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));

        let mut reader = BufReader::new(stream.try_clone().expect("mock stream clone"));
        let mut writer = stream;
        let mut events = events.into_iter();
        let mut statuses = report_statuses.into_iter();

        while let Some(request) = read_request(&mut reader) {
            let is_next_poll =
                request.method == "GET" && request.path.ends_with("/invocation/next");
            log.lock().unwrap().push(request);

            if is_next_poll {
                match events.next() {
                    Some(event) => write_event_response(&mut writer, &event),
                    // Out of scripted events; drop the connection.
                    None => return,
                }
            } else {
                let status = statuses.next().unwrap_or(202);
                write_status_response(&mut writer, status);
            }
        }
    });

    (addr, requests, handle)
}

fn read_request(reader: &mut BufReader<TcpStream>) -> Option<RecordedRequest> {
    let request_line = read_line(reader)?;
    if request_line.is_empty() {
        return None;
    }
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut request = RecordedRequest {
        method,
        path,
        headers,
        ..RecordedRequest::default()
    };

    if header_value(&request.headers, "transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        read_chunked_body(reader, &mut request)?;
    } else if let Some(length) = header_value(&request.headers, "content-length") {
        let length: usize = length.parse().ok()?;
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).ok()?;
        request.body = body;
    }

    Some(request)
}

fn read_chunked_body(reader: &mut BufReader<TcpStream>, request: &mut RecordedRequest) -> Option<()> {
    loop {
        let size_line = read_line(reader)?;
        let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
        if size == 0 {
            // Trailer block runs until the blank line.
            loop {
                let line = read_line(reader)?;
                if line.is_empty() {
                    return Some(());
                }
                if let Some((name, value)) = line.split_once(':') {
                    request
                        .trailers
                        .push((name.trim().to_string(), value.trim().to_string()));
                }
            }
        }
        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).ok()?;
        request.chunks.push(chunk);
        // Consume the CRLF that closes the chunk.
        let _ = read_line(reader)?;
    }
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw).ok()?;
    if n == 0 {
        return None;
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).ok()
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn write_event_response(writer: &mut TcpStream, event: &EventSpec) {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nLambda-Runtime-Aws-Request-Id: {}\r\nLambda-Runtime-Deadline-Ms: 1754000000000\r\nLambda-Runtime-Invoked-Function-Arn: arn:aws:lambda:eu-west-1:123456789012:function:mock\r\n",
        event.request_id
    );
    for (name, value) in &event.extra_headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n", event.body.len()));
    response.push_str(&event.body);
    let _ = writer.write_all(response.as_bytes());
    let _ = writer.flush();
}

fn write_status_response(writer: &mut TcpStream, status: u16) {
    let reason = match status {
        202 => "Accepted",
        413 => "Payload Too Large",
        _ => "OK",
    };
    let response = format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\n\r\n");
    let _ = writer.write_all(response.as_bytes());
    let _ = writer.flush();
}

const RUNTIME_ENV: &[&str] = &[
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AWS_LAMBDA_FUNCTION_NAME",
    "AWS_LAMBDA_FUNCTION_VERSION",
    "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
    "AWS_LAMBDA_INITIALIZATION_TYPE",
    "_HANDLER",
    "AWS_LAMBDA_LOG_GROUP_NAME",
    "AWS_LAMBDA_LOG_STREAM_NAME",
    "AWS_LAMBDA_RUNTIME_API",
    "_EXIT_ITERATIONS",
];

/// Populates the complete sandbox environment the config loader
/// requires, pointing the runtime at `addr` and bounding the loop to
/// `iterations` invocations.
pub fn set_runtime_env(addr: &str, iterations: usize) {
    env::set_var("AWS_REGION", "eu-west-1");
    env::set_var("AWS_ACCESS_KEY_ID", "AKIAMOCK");
    env::set_var("AWS_SECRET_ACCESS_KEY", "mock-secret");
    env::set_var("AWS_SESSION_TOKEN", "mock-token");
    env::set_var("AWS_LAMBDA_FUNCTION_NAME", "integration-test");
    env::set_var("AWS_LAMBDA_FUNCTION_VERSION", "$LATEST");
    env::set_var("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "128");
    env::set_var("AWS_LAMBDA_INITIALIZATION_TYPE", "on-demand");
    env::set_var("_HANDLER", "bootstrap");
    env::set_var("AWS_LAMBDA_LOG_GROUP_NAME", "/aws/lambda/integration-test");
    env::set_var("AWS_LAMBDA_LOG_STREAM_NAME", "2026/08/01/[$LATEST]mock");
    env::set_var("AWS_LAMBDA_RUNTIME_API", addr);
    env::set_var("_EXIT_ITERATIONS", iterations.to_string());
}

/// Removes every variable touched by [`set_runtime_env`] plus the trace
/// id the runtime installs per invocation.
pub fn clear_runtime_env() {
    for key in RUNTIME_ENV {
        env::remove_var(key);
    }
    env::remove_var("_X_AMZN_TRACE_ID");
}
