//! Seams between the exporter and the printer client.
//!
//! The pollers and the camera relay talk to printers through these traits so
//! tests can stand in scripted printers without a network.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use bambu_mqtt::{BambuClient, ClientError, StatusSnapshot};

/// Error from a status read.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("printer client error: {0}")]
    Client(String),
}

/// Error from a camera frame fetch.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No frame arrived within the allowed wait.
    #[error("no camera frame available")]
    Unavailable,
    /// The fetch itself failed.
    #[error("camera fetch failed: {0}")]
    Upstream(String),
}

/// Source of printer status for a poller.
pub trait StatusSource: Send + Sync + 'static {
    /// Read the current transport and report state.
    fn status(&self) -> Result<StatusSnapshot, SourceError>;
}

/// Source of camera frames for the relay.
pub trait FrameSource: Send + Sync + 'static {
    /// Fetch one JPEG frame, waiting at most `wait`.
    fn jpeg_frame(
        &self,
        wait: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, FrameError>> + Send;
}

impl StatusSource for BambuClient {
    fn status(&self) -> Result<StatusSnapshot, SourceError> {
        Ok(self.snapshot())
    }
}

impl FrameSource for BambuClient {
    async fn jpeg_frame(&self, wait: Duration) -> Result<Vec<u8>, FrameError> {
        self.camera_frame(wait).await.map_err(|e| match e {
            ClientError::FrameTimeout => FrameError::Unavailable,
            other => FrameError::Upstream(other.to_string()),
        })
    }
}
