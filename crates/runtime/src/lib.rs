#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Bolt Lambda Runtime
//!
//! A custom runtime driver for the AWS Lambda "OS-only" execution
//! environment. The function ships as a single executable named
//! `bootstrap`; this crate is the part of that executable that speaks
//! the Lambda Runtime API: discover the environment, initialize once,
//! then fetch-invoke-respond until the platform freezes or tears down
//! the sandbox.
//!
//! Everything is synchronous, single-threaded, blocking I/O. The
//! platform delivers one invocation at a time, so an executor would be
//! pure overhead.
//!
//! # Delivery modes
//!
//! - [`run_buffered`]: the handler returns the whole response, which is
//!   posted with a Content-Length body.
//! - [`run_streaming`]: the handler drives a [`ResponseStream`] and the
//!   response goes out as HTTP chunks while the handler is still
//!   running; failures after the headers are on the wire travel in
//!   HTTP trailers.
//!
//! # Examples
//!
//! ```no_run
//! use bolt_lambda_runtime::{run_buffered, Context, HandlerError};
//!
//! fn handler(ctx: &Context<'_>, event: &[u8]) -> Result<Vec<u8>, HandlerError> {
//!     ctx.log().info(&format!("{} byte event", event.len()));
//!     Ok(b"Hello, world!".to_vec())
//! }
//!
//! fn main() {
//!     if let Err(err) = run_buffered(handler) {
//!         eprintln!("fatal: {err}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

use std::env;
use std::thread;
use std::time::Duration;

mod arena;
mod config;
mod context;
mod error;
mod http_client;
mod logger;
mod stream;

pub use arena::InvocationArena;
pub use config::{Config, InitializationType};
pub use context::{Context, RequestMeta};
pub use error::{Error, HandlerError, Result};
pub use http_client::HttpError;
pub use logger::{Level, Logger};
pub use stream::{ResponseStream, StreamError};

use http_client::HttpClient;

/// Error type reported to the init-error endpoint for startup failures.
const INIT_ERROR_TYPE: &str = "Runtime.InitError";

/// Runs the invocation loop with a buffered handler.
///
/// The handler returns the complete response body; the runtime posts it
/// and fetches the next invocation. Does not return in production: the
/// platform terminates the process. An `Err` means initialization
/// failed (after best-effort reporting to the init-error endpoint) and
/// the process should exit non-zero.
///
/// # Errors
///
/// [`Error::Init`] when the environment is incomplete, [`Error::Http`]
/// when the runtime API cannot be reached at startup.
pub fn run_buffered<H>(mut handler: H) -> Result<()>
where
    H: FnMut(&Context<'_>, &[u8]) -> std::result::Result<Vec<u8>, HandlerError>,
{
    let mut runtime = Runtime::init(Logger::new())?;
    runtime.run(Mode::Buffered(&mut handler))
}

/// Runs the invocation loop with a streaming handler.
///
/// The handler receives a [`ResponseStream`] and may start emitting the
/// response while still working. Whatever state the handler leaves the
/// stream in, the runtime emits exactly one terminal report for the
/// invocation. Same return contract as [`run_buffered`].
///
/// # Errors
///
/// [`Error::Init`] when the environment is incomplete, [`Error::Http`]
/// when the runtime API cannot be reached at startup.
pub fn run_streaming<H>(mut handler: H) -> Result<()>
where
    H: FnMut(
        &Context<'_>,
        &[u8],
        &mut ResponseStream<'_>,
    ) -> std::result::Result<(), HandlerError>,
{
    let mut runtime = Runtime::init(Logger::new())?;
    runtime.run(Mode::Streaming(&mut handler))
}

/// Delivery mode of the current loop; the two entry wrappers share one
/// invocation driver parameterized by this.
enum Mode<'h> {
    Buffered(
        &'h mut dyn FnMut(&Context<'_>, &[u8]) -> std::result::Result<Vec<u8>, HandlerError>,
    ),
    Streaming(
        &'h mut dyn FnMut(
            &Context<'_>,
            &[u8],
            &mut ResponseStream<'_>,
        ) -> std::result::Result<(), HandlerError>,
    ),
}

/// Process-wide runtime state: the config snapshot, the runtime API
/// connection, the scratch arena and the log sink. Constructed once by
/// the entry wrappers and threaded through the loop; singleton by
/// usage, not by mechanism.
struct Runtime {
    config: Config,
    client: HttpClient,
    arena: InvocationArena,
    log: Logger,
}

impl Runtime {
    /// One-time startup: capture the environment and open the runtime
    /// API connection. Failures are reported to the init-error endpoint
    /// when the endpoint is known, then surfaced to the caller.
    fn init(log: Logger) -> Result<Self> {
        let config = match Config::from_env(&log) {
            Ok(config) => config,
            Err(err) => {
                log.error(&format!("{err}"));
                report_init_error(&log, &err);
                return Err(err);
            }
        };

        let mut client = HttpClient::new(config.api_endpoint.clone());
        if let Err(err) = client.ensure_connected() {
            let err = Error::from(err);
            log.error(&format!("{err}"));
            report_init_error(&log, &err);
            return Err(err);
        }

        log.info(&format!(
            "runtime initialized for {} ({})",
            config.function_name, config.function_version
        ));

        Ok(Self {
            config,
            client,
            arena: InvocationArena::new(),
            log,
        })
    }

    /// The fetch-invoke-respond loop. Returns only when the test-hook
    /// iteration budget is exhausted; in production it runs until the
    /// platform kills the process.
    fn run(&mut self, mut mode: Mode<'_>) -> Result<()> {
        let mut completed: usize = 0;
        loop {
            let (meta, event) = self.poll();
            self.dispatch(&mut mode, &meta, &event);

            completed += 1;
            if self.config.exit_iterations != 0 && completed >= self.config.exit_iterations {
                return Ok(());
            }
        }
    }

    /// Long-polls the next invocation, retrying transport failures with
    /// exponential backoff forever. The platform offers no recourse
    /// other than trying again, and it enforces its own deadlines.
    fn poll(&mut self) -> (RequestMeta, Vec<u8>) {
        let mut attempt: u32 = 0;
        loop {
            match self.client.get_next() {
                Ok(resp) => match RequestMeta::from_response(&resp) {
                    Ok(meta) => return (meta, resp.body),
                    Err(err) => {
                        // Without a request id there is nothing to report
                        // against; drop the event and poll again.
                        self.log.error(&format!("unusable invocation: {err}"));
                    }
                },
                Err(err) => {
                    self.log.warn(&format!("next-invocation poll failed: {err}"));
                }
            }
            thread::sleep(backoff_delay(attempt));
            attempt = attempt.saturating_add(1);
        }
    }

    /// One invocation: trace propagation, log binding, arena reset,
    /// handler call, terminal report, cleanup.
    fn dispatch(&mut self, mode: &mut Mode<'_>, meta: &RequestMeta, event: &[u8]) {
        context::install_trace_id(meta.xray_trace.as_deref());
        self.log.bind_request_id(&meta.request_id);
        self.arena.reset();

        let report = match mode {
            Mode::Buffered(handler) => {
                let ctx = Context::new(&self.config, meta, &self.arena, &self.log);
                match handler(&ctx, event) {
                    Ok(body) => self.client.post_response(&meta.request_id, &body),
                    Err(err) => {
                        self.log.error(&format!("handler failed: {err}"));
                        self.client.post_invoke_error(
                            &meta.request_id,
                            err.error_type(),
                            err.message(),
                        )
                    }
                }
            }
            Mode::Streaming(handler) => {
                let ctx = Context::new(&self.config, meta, &self.arena, &self.log);
                let mut stream = ResponseStream::new(&mut self.client, &meta.request_id);
                let outcome = handler(&ctx, event, &mut stream);
                if let Err(err) = &outcome {
                    self.log.error(&format!("handler failed: {err}"));
                }
                stream.finalize(&outcome)
            }
        };

        if let Err(err) = report {
            // The invocation is complete either way; the platform will
            // fail it on its own if no report landed.
            self.log
                .error(&format!("failed to report invocation outcome: {err}"));
        }

        self.log.clear_request_id();
        self.arena.reset();
    }
}

/// Best-effort init-error post; the endpoint may itself be the thing
/// that is missing or unreachable.
fn report_init_error(log: &Logger, err: &Error) {
    let Ok(endpoint) = env::var(config::ENV_RUNTIME_API) else {
        return;
    };
    let mut client = HttpClient::new(endpoint);
    if let Err(post_err) = client.post_init_error(INIT_ERROR_TYPE, &err.to_string()) {
        log.error(&format!("failed to report init error: {post_err}"));
    }
}

/// Retry schedule for the long poll: 50 ms doubling up to a 2 s cap.
fn backoff_delay(attempt: u32) -> Duration {
    const BASE_MS: u64 = 50;
    const CAP_MS: u64 = 2_000;
    Duration::from_millis(CAP_MS.min(BASE_MS << attempt.min(6)))
}
