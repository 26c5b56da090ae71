// Error types shared across the runtime.
//
// Two audiences: `Error` is what the runtime itself reports to the
// process that embeds it (startup and transport faults), while
// `HandlerError` is what user handlers return and what gets relayed to
// the Lambda control plane as an errorType/errorMessage pair.

use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

use crate::http_client::HttpError;

/// Fatal runtime error surfaced from the entry wrappers.
#[derive(Debug)]
pub enum Error {
    /// Startup failed before the first invocation was pulled.
    Init(String),
    /// A runtime API exchange failed in a way the loop cannot absorb.
    Http(HttpError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(msg) => write!(f, "initialization failed: {msg}"),
            Self::Http(err) => write!(f, "runtime API request failed: {err}"),
        }
    }
}

impl StdError for Error {}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        Self::Http(err)
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed invocation, as reported to the Lambda control plane.
///
/// The `error_type` becomes the `errorType` field of the error payload
/// (and the `Lambda-Runtime-Function-Error-Type` header); the message is
/// a best-effort human rendering. No stack traces are transmitted.
///
/// Deliberately not `std::error::Error`: the blanket conversion below
/// lets handlers use `?` on any standard error, at the cost of those
/// errors being reported under the generic `"HandlerError"` name. Name
/// the failure explicitly with [`HandlerError::new`] where it matters.
///
/// # Examples
///
/// ```
/// use bolt_lambda_runtime::HandlerError;
///
/// let err = HandlerError::new("BadInput", "expected a JSON object");
/// assert_eq!(err.error_type(), "BadInput");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    error_type: String,
    message: String,
}

impl HandlerError {
    /// Creates an error with an explicit control-plane error type.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// The identifier reported as `errorType`.
    #[must_use]
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    /// The human-readable rendering reported as `errorMessage`.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl<E: StdError + Send + Sync + 'static> From<E> for HandlerError {
    fn from(err: E) -> Self {
        Self::new("HandlerError", err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    #[serde(rename = "errorType")]
    error_type: &'a str,
    #[serde(rename = "errorMessage")]
    error_message: &'a str,
}

/// Serializes the JSON body posted to the error endpoints and carried
/// (base64-encoded) in the streaming error trailer.
pub(crate) fn error_payload_json(
    error_type: &str,
    message: &str,
) -> std::result::Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&ErrorPayload {
        error_type,
        error_message: message,
    })
}

static_assertions::assert_impl_all!(Error: Send, Sync);
static_assertions::assert_impl_all!(HandlerError: Send, Sync);
