// Per-invocation metadata and the handler-facing context view.

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::arena::InvocationArena;
use crate::config::Config;
use crate::http_client::{ApiResponse, HttpError};
use crate::logger::Logger;

pub(crate) const HEADER_REQUEST_ID: &str = "Lambda-Runtime-Aws-Request-Id";
const HEADER_TRACE_ID: &str = "Lambda-Runtime-Trace-Id";
const HEADER_INVOKED_FUNCTION_ARN: &str = "Lambda-Runtime-Invoked-Function-Arn";
const HEADER_DEADLINE_MS: &str = "Lambda-Runtime-Deadline-Ms";
const HEADER_CLIENT_CONTEXT: &str = "Lambda-Runtime-Client-Context";
const HEADER_COGNITO_IDENTITY: &str = "Lambda-Runtime-Cognito-Identity";

const X_AMZN_TRACE_ID: &str = "_X_AMZN_TRACE_ID";

/// Metadata of a single invocation, extracted from the long-poll
/// response headers and discarded when the invocation completes.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Platform-assigned id; every terminal report echoes it.
    pub request_id: String,
    /// X-Ray trace header, when sampling is active.
    pub xray_trace: Option<String>,
    /// Full ARN of the invoked function or alias.
    pub invoked_arn: String,
    /// Wall-clock deadline in epoch milliseconds. Advisory.
    pub deadline_ms: u64,
    /// Client context supplied by the mobile SDK, if any.
    pub client_context: Option<String>,
    /// Cognito identity supplied by the mobile SDK, if any.
    pub cognito_identity: Option<String>,
}

impl RequestMeta {
    pub(crate) fn from_response(resp: &ApiResponse) -> Result<Self, HttpError> {
        let request_id = resp
            .header(HEADER_REQUEST_ID)
            .ok_or_else(|| {
                HttpError::InvalidResponse(format!("missing {HEADER_REQUEST_ID} header"))
            })?
            .to_string();

        Ok(Self {
            request_id,
            xray_trace: resp.header(HEADER_TRACE_ID).map(str::to_string),
            invoked_arn: resp
                .header(HEADER_INVOKED_FUNCTION_ARN)
                .unwrap_or_default()
                .to_string(),
            deadline_ms: resp
                .header(HEADER_DEADLINE_MS)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            client_context: resp.header(HEADER_CLIENT_CONTEXT).map(str::to_string),
            cognito_identity: resp.header(HEADER_COGNITO_IDENTITY).map(str::to_string),
        })
    }

    /// Milliseconds until the platform deadline, saturating at zero.
    #[must_use]
    pub fn remaining_time_millis(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        self.deadline_ms.saturating_sub(now)
    }
}

/// Mirrors the trace header into `_X_AMZN_TRACE_ID` so downstream AWS
/// SDK calls made by the handler pick it up. Intentionally a
/// process-wide side effect, refreshed on every dispatch.
pub(crate) fn install_trace_id(trace: Option<&str>) {
    match trace {
        Some(id) => env::set_var(X_AMZN_TRACE_ID, id),
        None => env::remove_var(X_AMZN_TRACE_ID),
    }
}

/// The immutable view handed to handlers for the duration of one
/// invocation.
///
/// Owned allocations (`String`, `Vec<u8>`, …) made by the handler live
/// on the global heap and follow normal ownership; [`Context::arena`]
/// offers scratch space that is wiped when the invocation completes.
pub struct Context<'a> {
    config: &'a Config,
    request: &'a RequestMeta,
    arena: &'a InvocationArena,
    log: &'a Logger,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        config: &'a Config,
        request: &'a RequestMeta,
        arena: &'a InvocationArena,
        log: &'a Logger,
    ) -> Self {
        Self {
            config,
            request,
            arena,
            log,
        }
    }

    /// The process-wide configuration snapshot.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.config
    }

    /// Metadata of the invocation being handled.
    #[must_use]
    pub fn request(&self) -> &RequestMeta {
        self.request
    }

    /// Per-invocation scratch arena. Reset after the handler returns.
    #[must_use]
    pub fn arena(&self) -> &InvocationArena {
        self.arena
    }

    /// The process log sink; records are stamped with this invocation's
    /// request id.
    #[must_use]
    pub fn log(&self) -> &Logger {
        self.log
    }

    /// Case-sensitive lookup in the environment captured at startup.
    /// `None` means the variable was unset when the process began.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.config.env(key)
    }
}
