//! Logging and metrics setup.
//!
//! - **Logging**: `tracing` subscriber with JSON or pretty output, filtered by `RUST_LOG` or config
//! - **Metrics**: Prometheus recorder; counters are emitted with the `metrics` macros at call sites

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::init_metrics;
