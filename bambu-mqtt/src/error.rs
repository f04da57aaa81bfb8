//! Error types for printer communication.

use thiserror::Error;

/// Errors from printer client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// MQTT transport error.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Camera connection could not be established.
    #[error("camera connection failed: {0}")]
    CameraConnect(String),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// No camera frame arrived within the allowed wait.
    #[error("camera frame timeout")]
    FrameTimeout,

    /// The camera stream produced data that is not a JPEG frame.
    #[error("invalid camera frame: {0}")]
    InvalidFrame(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for printer client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
