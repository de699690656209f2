//! Logging setup and timing helpers.

mod logging;

pub use logging::{init_tracing, LogFormat, SpanTimer, DEFAULT_LOG_FILTER};
