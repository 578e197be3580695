//! Prometheus exporter for RabbitMQ queue statistics.
//!
//! Every scrape of the `/metrics` endpoint polls the RabbitMQ management API
//! and translates the per-queue statistics into gauges and counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Management API  │────>│ QueueCollector  │────>│   HTTP Server   │
//! │ (/api/queues)   │     │ (filter, proj.) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! rabbitsight-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod config;
pub mod error;
pub mod exporter;
pub mod exposition;
pub mod filter;
pub mod guard;
pub mod http;
pub mod projection;
pub mod queue;
pub mod record;
pub mod registry;

pub use client::{ManagementClient, Overview, ScrapeContext, StatsSource};
pub use config::{ConnectionMode, ExporterConfig};
pub use error::{CollectError, FetchError};
pub use exporter::Exporter;
pub use exposition::{Exposition, MetricSink, Sample};
pub use http::HttpServer;
pub use queue::QueueCollector;
pub use registry::MetricRegistry;
