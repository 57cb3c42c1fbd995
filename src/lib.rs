//! YAML Exporter
//!
//! Exposes metric families produced by registered collectors over HTTP in the
//! Prometheus text exposition format (version 0.0.4).
//!
//! # Architecture
//!
//! ```text
//! config dir ──▶ YamlCollector ──register──▶ Registry
//!                                               │ collect() per request
//!                                               ▼
//!         GET /metrics ◀── stream ◀── TextEncoder ◀── Snapshot
//! ```
//!
//! # Modules
//!
//! - [`model`] - Metric families, samples and snapshots
//! - [`registry`] - The `Collector` trait and the registry aggregating collectors
//! - [`exposition`] - Text format encoder
//! - [`server`] - HTTP exposition endpoint
//! - [`config`] - Configuration discovery and the YAML-defined collector
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod exposition;
pub mod model;
pub mod registry;
pub mod server;

// Re-export commonly used types
pub use config::YamlCollector;
pub use error::{Error, Result};
pub use exposition::{HelpName, TextEncoder};
pub use model::{MetricFamily, MetricType, Sample, Snapshot};
pub use registry::{Collector, Registry};
pub use server::MetricsServer;
