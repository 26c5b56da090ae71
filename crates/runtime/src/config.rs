// Process configuration snapshot.
//
// Read once before the first runtime API call; every invocation
// observes the same record. The full environment is captured into a
// table at the same time so `Context::env` lookups reflect the state at
// process start, not later mutations (the runtime itself mutates
// `_X_AMZN_TRACE_ID` per invocation).

use std::collections::HashMap;
use std::env;

use crate::error::Error;
use crate::logger::Logger;

pub(crate) const ENV_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";

const ENV_REGION: &str = "AWS_REGION";
const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const ENV_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";
const ENV_FUNCTION_VERSION: &str = "AWS_LAMBDA_FUNCTION_VERSION";
const ENV_FUNCTION_MEMORY_SIZE: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";
const ENV_INITIALIZATION_TYPE: &str = "AWS_LAMBDA_INITIALIZATION_TYPE";
const ENV_HANDLER: &str = "_HANDLER";
const ENV_LOG_GROUP_NAME: &str = "AWS_LAMBDA_LOG_GROUP_NAME";
const ENV_LOG_STREAM_NAME: &str = "AWS_LAMBDA_LOG_STREAM_NAME";
const ENV_EXIT_ITERATIONS: &str = "_EXIT_ITERATIONS";

/// How the platform provisioned this sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationType {
    /// Cold-started on demand.
    OnDemand,
    /// Pre-warmed provisioned concurrency.
    ProvisionedConcurrency,
    /// Restored from a SnapStart snapshot.
    SnapStart,
}

impl InitializationType {
    fn parse(value: &str, log: &Logger) -> Self {
        match value {
            "on-demand" => Self::OnDemand,
            "provisioned-concurrency" => Self::ProvisionedConcurrency,
            "snap-start" => Self::SnapStart,
            other => {
                log.warn(&format!(
                    "unknown {ENV_INITIALIZATION_TYPE} value {other:?}, assuming on-demand"
                ));
                Self::OnDemand
            }
        }
    }
}

/// Immutable configuration record, one per process.
#[derive(Debug)]
pub struct Config {
    /// Deployment region.
    pub region: String,
    /// Sandbox credentials: access key id.
    pub access_key_id: String,
    /// Sandbox credentials: secret access key.
    pub secret_access_key: String,
    /// Sandbox credentials: session token.
    pub session_token: String,
    /// Function name as configured in Lambda.
    pub function_name: String,
    /// Function version being executed.
    pub function_version: String,
    /// Configured memory limit in MiB.
    pub function_memory_mb: u64,
    /// How this sandbox was provisioned.
    pub initialization_type: InitializationType,
    /// The configured handler designator (opaque to this runtime).
    pub handler: String,
    /// CloudWatch log group receiving this sandbox's output.
    pub log_group: String,
    /// CloudWatch log stream receiving this sandbox's output.
    pub log_stream: String,
    /// host:port of the local runtime API endpoint.
    pub api_endpoint: String,
    /// Stop after this many completed invocations; 0 means run forever.
    pub(crate) exit_iterations: usize,
    env_table: HashMap<String, String>,
}

impl Config {
    /// Captures the environment into a configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] when a mandatory variable is missing or
    /// the memory size does not parse as a decimal integer.
    pub fn from_env(log: &Logger) -> Result<Self, Error> {
        let env_table: HashMap<String, String> = env::vars().collect();

        let required = |key: &str| -> Result<String, Error> {
            env_table
                .get(key)
                .cloned()
                .ok_or_else(|| Error::Init(format!("missing environment variable {key}")))
        };

        let memory = required(ENV_FUNCTION_MEMORY_SIZE)?;
        let function_memory_mb = memory.parse::<u64>().map_err(|_| {
            Error::Init(format!(
                "{ENV_FUNCTION_MEMORY_SIZE} is not a decimal integer: {memory:?}"
            ))
        })?;

        let initialization_type =
            InitializationType::parse(&required(ENV_INITIALIZATION_TYPE)?, log);

        let exit_iterations = env_table
            .get(ENV_EXIT_ITERATIONS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let region = required(ENV_REGION)?;
        let access_key_id = required(ENV_ACCESS_KEY_ID)?;
        let secret_access_key = required(ENV_SECRET_ACCESS_KEY)?;
        let session_token = required(ENV_SESSION_TOKEN)?;
        let function_name = required(ENV_FUNCTION_NAME)?;
        let function_version = required(ENV_FUNCTION_VERSION)?;
        let handler = required(ENV_HANDLER)?;
        let log_group = required(ENV_LOG_GROUP_NAME)?;
        let log_stream = required(ENV_LOG_STREAM_NAME)?;
        let api_endpoint = required(ENV_RUNTIME_API)?;

        Ok(Self {
            region,
            access_key_id,
            secret_access_key,
            session_token,
            function_name,
            function_version,
            function_memory_mb,
            initialization_type,
            handler,
            log_group,
            log_stream,
            api_endpoint,
            exit_iterations,
            env_table,
        })
    }

    /// Case-sensitive lookup in the environment captured at startup.
    /// Returns `None` for variables that were unset, never `Some("")`.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env_table.get(key).map(String::as_str)
    }
}

static_assertions::assert_impl_all!(Config: Send, Sync);
