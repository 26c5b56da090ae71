// Hand-rolled HTTP/1.1 client for the Lambda Runtime API.
//
// One long-lived connection to the loopback endpoint, reused across
// invocations and re-established on any socket failure. The framing is
// written by hand: the API surface is four fixed endpoints over plain
// HTTP, so a full client stack would buy nothing but binary size.
//
// Supported on the request side: Content-Length bodies and chunked
// transfer encoding with trailers (response streaming). On the response
// side: status line, named headers, Content-Length-bounded body.
//
// NOT supported (not needed for the Runtime API):
// - HTTPS/TLS (the endpoint is loopback inside the sandbox)
// - Redirects, cookies, compression
// - Connection pooling (the invocation loop is strictly sequential)
// - Client-side timeouts (the long poll blocks as long as the platform
//   wants it to; timing belongs to the platform)

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::error::error_payload_json;

/// Version segment of every Runtime API path.
pub(crate) const API_VERSION: &str = "2018-06-01";

/// Header naming the error type on error posts and stream trailers.
pub(crate) const HEADER_ERROR_TYPE: &str = "Lambda-Runtime-Function-Error-Type";
/// Trailer carrying the base64-encoded error payload of a failed stream.
pub(crate) const HEADER_ERROR_BODY: &str = "Lambda-Runtime-Function-Error-Body";
/// Header marking a response POST as streamed.
pub(crate) const HEADER_RESPONSE_MODE: &str = "Lambda-Runtime-Function-Response-Mode";

/// Transport-level error.
#[derive(Debug)]
pub enum HttpError {
    /// Socket failure; the connection is re-established on the next call.
    Io(io::Error),
    /// The peer sent something that is not parseable HTTP/1.1.
    InvalidResponse(String),
    /// The control plane answered outside the 2xx range.
    Status {
        /// HTTP status code received.
        status: u16,
        /// Response body, lossily decoded for logging.
        body: String,
    },
    /// An error report could not be serialized.
    Payload(serde_json::Error),
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "HTTP I/O error: {err}"),
            Self::InvalidResponse(msg) => write!(f, "invalid HTTP response: {msg}"),
            Self::Status { status, body } => write!(f, "unexpected status {status}: {body}"),
            Self::Payload(err) => write!(f, "error payload serialization failed: {err}"),
        }
    }
}

impl std::error::Error for HttpError {}

/// A parsed Runtime API response.
#[derive(Debug)]
pub(crate) struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Blocking HTTP/1.1 client bound to the Runtime API endpoint.
pub(crate) struct HttpClient {
    endpoint: String,
    conn: Option<BufReader<TcpStream>>,
}

impl HttpClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            conn: None,
        }
    }

    /// Establishes the connection if the slot is empty.
    pub fn ensure_connected(&mut self) -> Result<(), HttpError> {
        self.connect()?;
        Ok(())
    }

    /// Long-polls the next invocation. Blocks until the platform has an
    /// event; no client-side timeout is armed.
    pub fn get_next(&mut self) -> Result<ApiResponse, HttpError> {
        let head = request_head(
            "GET",
            &format!("/{API_VERSION}/runtime/invocation/next"),
            &self.endpoint,
            &[],
        );
        let resp = self.roundtrip(head.as_bytes(), &[])?;
        expect_2xx(resp)
    }

    /// Posts a buffered invocation response.
    pub fn post_response(&mut self, request_id: &str, body: &[u8]) -> Result<(), HttpError> {
        let path = format!("/{API_VERSION}/runtime/invocation/{request_id}/response");
        let length = body.len().to_string();
        let head = request_head(
            "POST",
            &path,
            &self.endpoint,
            &[
                ("Content-Type", "application/json"),
                ("Content-Length", &length),
            ],
        );
        let resp = self.roundtrip(head.as_bytes(), body)?;
        expect_2xx(resp).map(|_| ())
    }

    /// Reports a failed invocation.
    pub fn post_invoke_error(
        &mut self,
        request_id: &str,
        error_type: &str,
        message: &str,
    ) -> Result<(), HttpError> {
        let path = format!("/{API_VERSION}/runtime/invocation/{request_id}/error");
        self.post_error(&path, error_type, message)
    }

    /// Reports a startup failure, before any invocation was pulled.
    pub fn post_init_error(&mut self, error_type: &str, message: &str) -> Result<(), HttpError> {
        let path = format!("/{API_VERSION}/runtime/init/error");
        self.post_error(&path, error_type, message)
    }

    fn post_error(
        &mut self,
        path: &str,
        error_type: &str,
        message: &str,
    ) -> Result<(), HttpError> {
        let body = error_payload_json(error_type, message).map_err(HttpError::Payload)?;
        let length = body.len().to_string();
        let head = request_head(
            "POST",
            path,
            &self.endpoint,
            &[
                ("Content-Type", "application/json"),
                (HEADER_ERROR_TYPE, error_type),
                ("Content-Length", &length),
            ],
        );
        let resp = self.roundtrip(head.as_bytes(), &body)?;
        expect_2xx(resp).map(|_| ())
    }

    /// Starts a chunked response POST: request line, headers and the
    /// trailer declaration go on the wire; no body bytes yet. The
    /// response is read by [`HttpClient::finish_stream`] once the
    /// terminator has been sent.
    pub fn open_stream(&mut self, request_id: &str, content_type: &str) -> Result<(), HttpError> {
        let path = format!("/{API_VERSION}/runtime/invocation/{request_id}/response");
        let trailer_names = format!("{HEADER_ERROR_TYPE}, {HEADER_ERROR_BODY}");
        let head = request_head(
            "POST",
            &path,
            &self.endpoint,
            &[
                ("Content-Type", content_type),
                (HEADER_RESPONSE_MODE, "streaming"),
                ("Transfer-Encoding", "chunked"),
                ("Trailer", &trailer_names),
            ],
        );
        self.send(head.as_bytes())
    }

    /// Emits one non-empty chunk. Empty input writes nothing: a
    /// zero-length chunk is the stream terminator and is only ever
    /// produced by [`HttpClient::finish_stream`].
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut frame = Vec::with_capacity(data.len() + 16);
        encode_chunk(&mut frame, data);
        self.send(&frame)
    }

    /// Terminates the chunked body (zero-length chunk plus trailer
    /// block) and reads the control plane's verdict.
    pub fn finish_stream(&mut self, trailers: &[(&str, &str)]) -> Result<(), HttpError> {
        let mut frame = Vec::new();
        encode_terminator(&mut frame, trailers);
        self.send(&frame)?;
        let resp = self.read()?;
        expect_2xx(resp).map(|_| ())
    }

    fn connect(&mut self) -> io::Result<&mut BufReader<TcpStream>> {
        if self.conn.is_none() {
            let stream = TcpStream::connect(&self.endpoint)?;
            self.conn = Some(BufReader::new(stream));
        }
        // Slot was just filled above; io::Error otherwise.
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection slot empty"))
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        match self.try_send(bytes) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.conn = None;
                Err(HttpError::Io(err))
            }
        }
    }

    fn try_send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let conn = self.connect()?;
        let stream = conn.get_mut();
        stream.write_all(bytes)?;
        stream.flush()
    }

    fn read(&mut self) -> Result<ApiResponse, HttpError> {
        let result = match self.conn.as_mut() {
            Some(conn) => read_response(conn),
            None => Err(HttpError::InvalidResponse(
                "response read without a live connection".to_string(),
            )),
        };
        if result.is_err() {
            // A failed or desynchronized read poisons the framing;
            // reconnect before the next exchange.
            self.conn = None;
        }
        result
    }

    fn roundtrip(&mut self, head: &[u8], body: &[u8]) -> Result<ApiResponse, HttpError> {
        if body.is_empty() {
            self.send(head)?;
        } else {
            let mut request = Vec::with_capacity(head.len() + body.len());
            request.extend_from_slice(head);
            request.extend_from_slice(body);
            self.send(&request)?;
        }
        self.read()
    }
}

fn expect_2xx(resp: ApiResponse) -> Result<ApiResponse, HttpError> {
    if (200..300).contains(&resp.status) {
        Ok(resp)
    } else {
        Err(HttpError::Status {
            status: resp.status,
            body: String::from_utf8_lossy(&resp.body).into_owned(),
        })
    }
}

fn request_head(method: &str, path: &str, host: &str, headers: &[(&str, &str)]) -> String {
    let mut head = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\n");
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head
}

fn encode_chunk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn encode_terminator(out: &mut Vec<u8>, trailers: &[(&str, &str)]) {
    out.extend_from_slice(b"0\r\n");
    for (name, value) in trailers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

fn read_response<R: BufRead>(reader: &mut R) -> Result<ApiResponse, HttpError> {
    let status_line = read_line(reader)?;
    let status = parse_status_line(&status_line)?;

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        headers.push(parse_header_line(&line)?);
    }

    let length = content_length(&headers)?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).map_err(HttpError::Io)?;

    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, HttpError> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw).map_err(HttpError::Io)?;
    if n == 0 {
        return Err(HttpError::InvalidResponse(
            "connection closed mid-response".to_string(),
        ));
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw)
        .map_err(|_| HttpError::InvalidResponse("non-UTF-8 header data".to_string()))
}

fn parse_status_line(line: &str) -> Result<u16, HttpError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::InvalidResponse(format!(
            "malformed status line: {line:?}"
        )));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| HttpError::InvalidResponse(format!("malformed status line: {line:?}")))
}

fn parse_header_line(line: &str) -> Result<(String, String), HttpError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| HttpError::InvalidResponse(format!("malformed header: {line:?}")))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn content_length(headers: &[(String, String)]) -> Result<usize, HttpError> {
    match headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
    {
        Some((_, value)) => value.parse().map_err(|_| {
            HttpError::InvalidResponse(format!("unparseable Content-Length: {value:?}"))
        }),
        None => Ok(0),
    }
}
