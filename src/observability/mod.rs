//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured tracing events for machine parsing
//! - Metrics are cheap (atomic increments)
//! - The exporter listens on its own address, away from the API

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
