//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing and per-second pipeline statistics.

pub mod logging;
pub mod stats;

pub use logging::{init_logging, LogConfig, LogGuard, LoggingError};
pub use stats::{TickStats, WindowStats};
