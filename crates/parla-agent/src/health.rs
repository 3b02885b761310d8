//! Health-check endpoint for deployment platforms.
//!
//! Render-mode only. The listener is bound before the session bootstraps, so
//! liveness probes succeed regardless of session readiness. Shares no state
//! with the session loop.

use crate::AgentError;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;

/// Health check handler.
///
/// Returns `200 OK` with a fixed body. Used by the deployment platform's
/// liveness probes.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "agent": "english-teacher-agent",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the health router. All other paths 404.
pub fn app() -> Router {
    Router::new().route("/health", get(health))
}

/// Binds the health listener on all interfaces at the given port.
pub async fn bind(port: u16) -> Result<TcpListener, AgentError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| AgentError::Health(format!("failed to bind {addr}: {e}")))
}

/// Serves the health router for the process lifetime.
pub async fn serve(listener: TcpListener) -> Result<(), AgentError> {
    axum::serve(listener, app())
        .await
        .map_err(|e| AgentError::Health(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let app = app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["agent"], "english-teacher-agent");
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_live_over_a_real_listener_without_any_session() {
        // Bind an ephemeral port and probe it the way the platform would.
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = serve(listener).await;
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"ok\""));
    }
}
