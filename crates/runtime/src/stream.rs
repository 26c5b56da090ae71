// Streaming response delegate.
//
// Wraps the transport's chunked-body support in the four-state surface
// handlers program against. Writes accumulate in an internal buffer and
// only hit the wire on flush/publish, so a handler emitting many small
// tokens does not pay per-token chunk framing.
//
// Once `open` has put headers on the wire, the ordinary error endpoint
// is no longer available for this invocation; failures are reported in
// the trailer block of the terminating chunk instead. That asymmetry is
// the whole reason this type tracks state explicitly.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{error_payload_json, HandlerError};
use crate::http_client::{HttpClient, HttpError, HEADER_ERROR_BODY, HEADER_ERROR_TYPE};

/// Misuse or transport failure of the streaming delegate.
///
/// Deliberately not `std::error::Error` so that `?` in a handler
/// converts it through the dedicated [`HandlerError`] impl below,
/// keeping the control-plane error names stable.
#[derive(Debug)]
pub enum StreamError {
    /// A write-side operation was called before `open`.
    NotOpen,
    /// `open` was called a second time.
    AlreadyOpen,
    /// An operation was called after the stream was closed.
    Closed,
    /// The underlying connection failed; the invocation is likely
    /// unreportable.
    Transport(HttpError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "stream is not open"),
            Self::AlreadyOpen => write!(f, "stream is already open"),
            Self::Closed => write!(f, "stream is closed"),
            Self::Transport(err) => write!(f, "stream transport failed: {err}"),
        }
    }
}

impl From<StreamError> for HandlerError {
    fn from(err: StreamError) -> Self {
        match &err {
            StreamError::Transport(_) => HandlerError::new("Runtime.StreamFault", err.to_string()),
            _ => HandlerError::new("Runtime.StreamMisuse", err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unopened,
    OpenEmpty,
    OpenBuffered,
    Closed,
}

/// Handler-facing writer for streamed responses.
///
/// State machine: **unopened** → `open` → **open** (empty or buffered,
/// tracking whether unflushed bytes exist) → `close`/`close_with_error`
/// → **closed**. The runtime finalizes whatever state the handler
/// leaves behind, so calling `close` explicitly is optional.
///
/// Implements `write!`/`writeln!` via [`ResponseStream::write_fmt`].
pub struct ResponseStream<'c> {
    client: &'c mut HttpClient,
    request_id: &'c str,
    state: State,
    buf: Vec<u8>,
}

impl<'c> ResponseStream<'c> {
    pub(crate) fn new(client: &'c mut HttpClient, request_id: &'c str) -> Self {
        Self {
            client,
            request_id,
            state: State::Unopened,
            buf: Vec::new(),
        }
    }

    /// Sends the response headers, committing this invocation to the
    /// streamed delivery mode.
    ///
    /// # Errors
    ///
    /// [`StreamError::AlreadyOpen`] on a second call (the stream state
    /// is left untouched), [`StreamError::Closed`] after close.
    pub fn open(&mut self, content_type: &str) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => {
                self.client
                    .open_stream(self.request_id, content_type)
                    .map_err(StreamError::Transport)?;
                self.state = State::OpenEmpty;
                Ok(())
            }
            State::OpenEmpty | State::OpenBuffered => Err(StreamError::AlreadyOpen),
            State::Closed => Err(StreamError::Closed),
        }
    }

    /// Appends bytes to the internal buffer. Nothing goes on the wire
    /// until `flush` or `publish`.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotOpen`] before `open`, [`StreamError::Closed`]
    /// after close.
    pub fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => Err(StreamError::NotOpen),
            State::Closed => Err(StreamError::Closed),
            State::OpenEmpty | State::OpenBuffered => {
                if !data.is_empty() {
                    self.buf.extend_from_slice(data);
                    self.state = State::OpenBuffered;
                }
                Ok(())
            }
        }
    }

    /// Formats into the internal buffer; `write!(stream, ...)` resolves
    /// here.
    ///
    /// # Errors
    ///
    /// Same state errors as [`ResponseStream::write`].
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), StreamError> {
        self.write(args.to_string().as_bytes())
    }

    /// Emits the buffered bytes as one HTTP chunk, if any.
    ///
    /// # Errors
    ///
    /// State errors as above, or [`StreamError::Transport`] when the
    /// chunk cannot be written.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => Err(StreamError::NotOpen),
            State::Closed => Err(StreamError::Closed),
            State::OpenEmpty => Ok(()),
            State::OpenBuffered => {
                self.client
                    .write_chunk(&self.buf)
                    .map_err(StreamError::Transport)?;
                self.buf.clear();
                self.state = State::OpenEmpty;
                Ok(())
            }
        }
    }

    /// Appends then immediately flushes: one chunk carrying any
    /// previously buffered bytes plus `data`.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseStream::write`] and [`ResponseStream::flush`].
    pub fn publish(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.write(data)?;
        self.flush()
    }

    /// Formats, appends, then immediately flushes.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseStream::publish`].
    pub fn publish_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), StreamError> {
        self.write_fmt(args)?;
        self.flush()
    }

    /// Terminates the stream normally: flushes any buffered bytes, then
    /// sends the zero-length chunk with empty trailers. A no-op before
    /// `open` and after close.
    ///
    /// # Errors
    ///
    /// [`StreamError::Transport`] when the terminator cannot be written
    /// or the control plane rejects the response.
    pub fn close(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Unopened | State::Closed => Ok(()),
            State::OpenEmpty | State::OpenBuffered => {
                self.flush()?;
                self.state = State::Closed;
                self.client
                    .finish_stream(&[])
                    .map_err(StreamError::Transport)
            }
        }
    }

    /// Terminates the stream reporting `err`. Before `open` this uses
    /// the ordinary invoke-error endpoint; after `open` the error rides
    /// in the trailer block. Short-circuits any further writes.
    ///
    /// # Errors
    ///
    /// [`StreamError::Transport`] when the report cannot be delivered.
    pub fn close_with_error(&mut self, err: &HandlerError) -> Result<(), StreamError> {
        match self.state {
            State::Closed => Ok(()),
            State::Unopened => {
                self.state = State::Closed;
                self.client
                    .post_invoke_error(self.request_id, err.error_type(), err.message())
                    .map_err(StreamError::Transport)
            }
            State::OpenEmpty | State::OpenBuffered => {
                self.flush()?;
                self.state = State::Closed;
                let trailers = error_trailers(err).map_err(StreamError::Transport)?;
                self.client
                    .finish_stream(&[
                        (HEADER_ERROR_TYPE, err.error_type()),
                        (HEADER_ERROR_BODY, &trailers),
                    ])
                    .map_err(StreamError::Transport)
            }
        }
    }

    /// Emits the terminal report the handler did not: an empty buffered
    /// response when the stream was never opened, or the terminating
    /// chunk (with error trailers if the handler failed) when it was.
    pub(crate) fn finalize(
        mut self,
        outcome: &Result<(), HandlerError>,
    ) -> Result<(), HttpError> {
        match (self.state, outcome) {
            // Explicit close already produced the terminal report.
            (State::Closed, _) => Ok(()),
            (State::Unopened, Ok(())) => self.client.post_response(self.request_id, b""),
            (State::Unopened, Err(err)) => {
                self.client
                    .post_invoke_error(self.request_id, err.error_type(), err.message())
            }
            (State::OpenEmpty | State::OpenBuffered, Ok(())) => {
                self.client.write_chunk(&self.buf)?;
                self.client.finish_stream(&[])
            }
            (State::OpenEmpty | State::OpenBuffered, Err(err)) => {
                self.client.write_chunk(&self.buf)?;
                let body = error_trailers(err)?;
                self.client.finish_stream(&[
                    (HEADER_ERROR_TYPE, err.error_type()),
                    (HEADER_ERROR_BODY, &body),
                ])
            }
        }
    }
}

/// Base64 rendering of the error payload carried in the trailer block.
fn error_trailers(err: &HandlerError) -> Result<String, HttpError> {
    let payload = error_payload_json(err.error_type(), err.message()).map_err(HttpError::Payload)?;
    Ok(BASE64.encode(payload))
}
