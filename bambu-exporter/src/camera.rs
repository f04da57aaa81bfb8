//! HTTP relay for the printer camera.
//!
//! Runs on its own listener (metrics port + 1) so image traffic can never
//! hold up a metrics scrape. The relay is stateless: every `/camera` request
//! fetches one fresh frame from the first configured printer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::source::{FrameError, FrameSource};

/// Upper bound on waiting for a frame before answering 404.
const FRAME_WAIT: Duration = Duration::from_secs(5);

/// Auto-refreshing wrapper page. The meta refresh re-requests `/camera` on a
/// fixed short interval; no scripting, no query parameters.
const CAMERA_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="2">
    <title>Printer Camera</title>
    <style>
        body { margin: 0; padding: 0; background: #000; display: flex; justify-content: center; align-items: center; height: 100vh; }
        img { max-width: 100%; max-height: 100vh; object-fit: contain; }
    </style>
</head>
<body>
    <img src="/camera" alt="printer camera">
</body>
</html>
"#;

/// Shared relay state: the configured printers, in config order.
struct CameraHub<S> {
    printers: Vec<(String, S)>,
}

/// Create the relay router.
fn create_router<S: FrameSource>(printers: Vec<(String, S)>) -> Router {
    let hub = Arc::new(CameraHub { printers });

    Router::new()
        .route("/camera", get(camera_handler::<S>))
        .route("/camera.html", get(camera_html_handler))
        .route("/health", get(health_handler::<S>))
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

/// Handler for the /camera endpoint.
async fn camera_handler<S: FrameSource>(State(hub): State<Arc<CameraHub<S>>>) -> Response {
    let Some((name, source)) = hub.printers.first() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "No printers connected").into_response();
    };

    match source.jpeg_frame(FRAME_WAIT).await {
        Ok(frame) => (
            StatusCode::OK,
            [("content-type", "image/jpeg")],
            frame,
        )
            .into_response(),
        Err(FrameError::Unavailable) => {
            (StatusCode::NOT_FOUND, "Camera image not available").into_response()
        }
        Err(e) => {
            error!(printer = %name, error = %e, "camera fetch failed");
            (StatusCode::BAD_GATEWAY, "Camera fetch failed").into_response()
        }
    }
}

/// Handler for the /camera.html endpoint.
async fn camera_html_handler() -> Html<&'static str> {
    Html(CAMERA_HTML)
}

/// Handler for the /health endpoint.
async fn health_handler<S: FrameSource>(State(hub): State<Arc<CameraHub<S>>>) -> Response {
    let body = format!(
        "{{\"status\":\"ok\",\"printers\":{}}}",
        hub.printers.len()
    );
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        body,
    )
        .into_response()
}

/// Camera relay HTTP server.
pub struct CameraServer<S> {
    printers: Vec<(String, S)>,
    listen_addr: SocketAddr,
}

impl<S: FrameSource> CameraServer<S> {
    /// Create a new relay over the given printers (config order; the first
    /// one serves the frames).
    pub fn new(printers: Vec<(String, S)>, listen_addr: SocketAddr) -> Self {
        Self {
            printers,
            listen_addr,
        }
    }

    /// Run the relay until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.printers);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "camera relay listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("camera relay shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("Camera relay error: {}", e))?;

        info!("camera relay stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    #[derive(Clone)]
    enum ScriptedCamera {
        Frame(Vec<u8>),
        Unavailable,
        Broken,
    }

    impl FrameSource for ScriptedCamera {
        async fn jpeg_frame(&self, _wait: Duration) -> Result<Vec<u8>, FrameError> {
            match self {
                Self::Frame(frame) => Ok(frame.clone()),
                Self::Unavailable => Err(FrameError::Unavailable),
                Self::Broken => Err(FrameError::Upstream("connection reset".to_string())),
            }
        }
    }

    fn camera(script: ScriptedCamera) -> Vec<(String, ScriptedCamera)> {
        vec![("x1c".to_string(), script)]
    }

    #[tokio::test]
    async fn test_camera_returns_jpeg_bytes() {
        let frame = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0xff, 0xd9];
        let router = create_router(camera(ScriptedCamera::Frame(frame.clone())));

        let response = router
            .oneshot(Request::get("/camera").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "image/jpeg"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.to_vec(), frame);
    }

    #[tokio::test]
    async fn test_camera_unavailable_is_404() {
        let router = create_router(camera(ScriptedCamera::Unavailable));

        let response = router
            .oneshot(Request::get("/camera").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_camera_fetch_failure_is_502() {
        let router = create_router(camera(ScriptedCamera::Broken));

        let response = router
            .oneshot(Request::get("/camera").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_camera_without_printers_is_503() {
        let router = create_router(Vec::<(String, ScriptedCamera)>::new());

        let response = router
            .oneshot(Request::get("/camera").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_camera_html_has_refresh_directive() {
        let router = create_router(camera(ScriptedCamera::Unavailable));

        let response = router
            .oneshot(Request::get("/camera.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("http-equiv=\"refresh\""));
        assert!(body.contains("src=\"/camera\""));
    }

    #[tokio::test]
    async fn test_health_reports_printer_count() {
        let router = create_router(camera(ScriptedCamera::Unavailable));

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("\"printers\":1"));
    }
}
