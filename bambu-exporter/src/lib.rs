//! Prometheus exporter and camera relay for Bambu Lab printers.
//!
//! The exporter polls each configured printer over its local MQTT interface
//! and serves the resulting gauges on `/metrics`, plus a JPEG camera relay
//! on a second listener.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │   Printers   │────>│  Pollers (1/ea)  │────>│  HTTP /metrics  │
//! │ (MQTT, 8883) │     │  MetricRegistry  │     │   (port 9100)   │
//! └──────────────┘     └──────────────────┘     └─────────────────┘
//!        │
//!        │ TLS :6000        ┌─────────────────┐
//!        └─────────────────>│  Camera relay   │
//!                           │   (port 9101)   │
//!                           └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! bambu-exporter --config config.yaml
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod camera;
pub mod catalog;
pub mod config;
pub mod http;
pub mod mapping;
pub mod poller;
pub mod registry;
pub mod source;

pub use camera::CameraServer;
pub use config::ExporterConfig;
pub use http::HttpServer;
pub use mapping::PrinterState;
pub use poller::PrinterPoller;
pub use registry::{MetricBatch, MetricRegistry, SharedRegistry};
pub use source::{FrameSource, StatusSource};
