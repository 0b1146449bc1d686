use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// The configuration values that dictate the behavior of the pool node.
///
/// These values are not consensus-critical: nodes that differ in them still agree on every bond,
/// selection and settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The number of worker threads of the runtime.
    ///
    /// Default is [`DEFAULT_THREAD_COUNT`](crate::constants::DEFAULT_THREAD_COUNT).
    pub num_threads: Option<u8>,

    /// The stack size of every worker thread, in bytes.
    ///
    /// Default is [`DEFAULT_THREAD_STACK_SIZE`](crate::constants::DEFAULT_THREAD_STACK_SIZE).
    pub thread_stack_size: Option<usize>,

    /// The OpenTelemetry collector to export traces to.
    ///
    /// Takes precedence over the `OPERATOR_POOL_OTLP_URL` environment variable.
    pub otlp_url: Option<String>,

    /// Where withdrawal fees and slashed stake are sent.
    pub sink: SinkDestination,

    /// How long to wait for the pool actor to stop once stdin is closed.
    ///
    /// Default is [`DEFAULT_SHUTDOWN_TIMEOUT`](crate::constants::DEFAULT_SHUTDOWN_TIMEOUT).
    pub shutdown_timeout: Option<Duration>,
}

/// The destination of funds that leave the pool without going to an operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SinkDestination {
    /// The funds are burned.
    #[default]
    Burn,

    /// The funds are sent to the treasury.
    Treasury,
}

impl fmt::Display for SinkDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkDestination::Burn => write!(f, "burn"),
            SinkDestination::Treasury => write!(f, "treasury"),
        }
    }
}
