//! Status and camera access for Bambu Lab printers on the local network.
//!
//! Printers expose an MQTT broker on port 8883 (TLS, self-signed) that
//! publishes JSON telemetry reports, and a small TLS service on port 6000
//! that streams chamber camera frames. This crate wraps both:
//!
//! - [`BambuClient`] maintains the MQTT session in a background task and
//!   merges incoming reports into a cached [`PrinterReport`]; callers read
//!   the cache through [`BambuClient::snapshot`].
//! - [`BambuClient::camera_frame`] fetches a single JPEG frame on demand.
//!
//! # Example
//!
//! ```ignore
//! use bambu_mqtt::{BambuClient, PrinterAddress};
//!
//! let client = BambuClient::connect(PrinterAddress {
//!     ip: "192.168.1.50".parse()?,
//!     serial: "01S00A000000000".into(),
//!     access_code: "12345678".into(),
//! });
//!
//! let snapshot = client.snapshot();
//! if let Some(temp) = snapshot.report.nozzle_temp {
//!     println!("nozzle: {temp} °C");
//! }
//! ```

pub mod camera;
pub mod client;
pub mod error;
pub mod report;

pub use client::{BambuClient, PrinterAddress, StatusSnapshot};
pub use error::{ClientError, Result};
pub use report::{LightState, PrinterReport};
