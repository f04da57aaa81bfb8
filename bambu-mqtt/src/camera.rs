//! Chamber camera frame access.
//!
//! The printer serves JPEG frames over a small TLS protocol on port 6000:
//! the client sends one fixed-size authentication packet, then the printer
//! streams frames, each prefixed with a 16-byte header carrying the payload
//! length. One connection per fetch keeps the relay stateless.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ClientError, Result};

/// TCP port of the camera service.
const CAMERA_PORT: u16 = 6000;

/// Username for the camera authentication packet (same for all printers).
const CAMERA_USERNAME: &str = "bblp";

/// Upper bound on a single frame payload; anything larger means the stream
/// is out of sync.
const MAX_FRAME_BYTES: u32 = 10 * 1024 * 1024;

const JPEG_START: [u8; 4] = [0xff, 0xd8, 0xff, 0xe0];
const JPEG_END: [u8; 2] = [0xff, 0xd9];

/// Fetch a single JPEG frame from the printer camera.
///
/// The whole exchange (connect, authenticate, read one frame) is bounded by
/// `wait`; on expiry the caller gets [`ClientError::FrameTimeout`].
pub async fn fetch_frame(ip: IpAddr, access_code: &str, wait: Duration) -> Result<Vec<u8>> {
    match tokio::time::timeout(wait, fetch_frame_inner(ip, access_code)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::FrameTimeout),
    }
}

async fn fetch_frame_inner(ip: IpAddr, access_code: &str) -> Result<Vec<u8>> {
    let stream = TcpStream::connect((ip, CAMERA_PORT))
        .await
        .map_err(|e| ClientError::CameraConnect(e.to_string()))?;

    let connector = TlsConnector::from(tls_config()?);
    let server_name =
        ServerName::try_from(ip.to_string()).map_err(|e| ClientError::Tls(e.to_string()))?;
    let mut tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ClientError::Tls(e.to_string()))?;

    tls.write_all(&auth_packet(CAMERA_USERNAME, access_code))
        .await?;

    let mut header = [0u8; 16];
    tls.read_exact(&mut header).await?;
    let payload_len = frame_payload_len(&header)?;

    let mut payload = vec![0u8; payload_len as usize];
    tls.read_exact(&mut payload).await?;
    validate_jpeg(&payload)?;

    debug!(bytes = payload.len(), "camera frame received");
    Ok(payload)
}

/// TLS client config accepting the printer's self-signed certificate.
///
/// The camera endpoint presents the same self-signed certificate as the MQTT
/// listener; on a LAN deployment there is no CA to pin against.
fn tls_config() -> Result<Arc<rustls::ClientConfig>> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptPrinterCert { provider }))
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Build the 80-byte authentication packet: a 16-byte header followed by the
/// username and access code, each NUL-padded to 32 bytes.
fn auth_packet(username: &str, access_code: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(80);
    packet.extend_from_slice(&0x40u32.to_le_bytes());
    packet.extend_from_slice(&0x3000u32.to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&padded_field(username));
    packet.extend_from_slice(&padded_field(access_code));
    packet
}

fn padded_field(value: &str) -> [u8; 32] {
    let mut field = [0u8; 32];
    let bytes = value.as_bytes();
    let len = bytes.len().min(32);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Extract and sanity-check the payload length from a frame header.
fn frame_payload_len(header: &[u8; 16]) -> Result<u32> {
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(ClientError::InvalidFrame(format!(
            "implausible frame length {len}"
        )));
    }
    Ok(len)
}

/// Check the payload for JPEG start/end markers.
fn validate_jpeg(payload: &[u8]) -> Result<()> {
    if payload.len() < JPEG_START.len() + JPEG_END.len()
        || payload[..JPEG_START.len()] != JPEG_START
        || payload[payload.len() - JPEG_END.len()..] != JPEG_END
    {
        return Err(ClientError::InvalidFrame(
            "missing JPEG markers".to_string(),
        ));
    }
    Ok(())
}

/// Certificate verifier for the printer's self-signed certificate.
#[derive(Debug)]
struct AcceptPrinterCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptPrinterCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
