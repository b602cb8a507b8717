//! HTTP control surface.
//!
//! Every endpoint answers with the same JSON envelope:
//! `{"status": <code>, "error": "<message>", "data": <payload|null>}`.
//!
//! The envelope `status` always equals the HTTP status. A missing or blank
//! `name` (or an unparsable `sig`) is answered with HTTP 400 and
//! `"status": 400`. It is not HTTP 200 with `"status": 500`, so clients
//! that key on an envelope 500 for a rejected request must check for 400.

use crate::control::Registry;
use crate::error::SupervisorError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ResponseData {
    pub status: u16,
    pub error: String,
    pub data: Option<Value>,
}

impl ResponseData {
    fn ok(data: Option<Value>) -> Self {
        Self { status: StatusCode::OK.as_u16(), error: String::new(), data }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessQuery {
    name: Option<String>,
    sig: Option<String>,
}

impl ProcessQuery {
    fn name(&self) -> Result<&str, ApiError> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::BadRequest(SupervisorError::MissingName.to_string()))
    }

    // Absent or blank means 0, the liveness check. The range is not checked.
    fn signal(&self) -> Result<i32, ApiError> {
        match self.sig.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(0),
            Some(raw) => raw
                .parse::<i32>()
                .map_err(|e| ApiError::BadRequest(format!("invalid sig `{}`: {}", raw, e))),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        warn!(status = %status, error = %message, "request rejected");
        let body = ResponseData { status: status.as_u16(), error: message, data: None };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<ResponseData>, ApiError>;

pub fn create_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/process", any(list_handler))
        .route("/process/info", any(info_handler))
        .route("/process/start", any(start_handler))
        .route("/process/stop", any(stop_handler))
        .route("/process/signal", any(signal_handler))
        .with_state(registry)
}

async fn list_handler(State(registry): State<Arc<Registry>>) -> ApiResult {
    let status = registry.status_snapshot().await;
    let data = serde_json::to_value(status).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ResponseData::ok(Some(data))))
}

async fn info_handler(State(registry): State<Arc<Registry>>) -> ApiResult {
    let details = registry.details().await;
    let data = serde_json::to_value(details).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ResponseData::ok(Some(data))))
}

async fn start_handler(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<ProcessQuery>,
) -> ApiResult {
    let name = query.name()?;
    registry.start_by_name(name).await;
    Ok(Json(ResponseData::ok(None)))
}

async fn stop_handler(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<ProcessQuery>,
) -> ApiResult {
    let name = query.name()?;
    registry.stop_by_name(name).await;
    Ok(Json(ResponseData::ok(None)))
}

async fn signal_handler(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<ProcessQuery>,
) -> ApiResult {
    let name = query.name()?;
    let sig = query.signal()?;
    // Delivery is best-effort; the outcome is not reported to the caller.
    if let Err(e) = registry.forward_signal(name, sig).await {
        debug!(process = name, sig, error = %e, "signal not delivered");
    }
    Ok(Json(ResponseData::ok(None)))
}

/// Binds `addr` and serves the control surface until `shutdown` resolves.
pub async fn serve<F>(addr: &str, registry: Arc<Registry>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "control surface listening");
    axum::serve(listener, create_router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ProcessConfig, Timings};
    use crate::runtime::Supervised;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt; // for `oneshot`

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new(Timings {
            alive_poll: Duration::from_millis(20),
            parked_poll: Duration::from_millis(40),
            launch_backoff: Duration::from_millis(100),
        }))
    }

    async fn call(registry: Arc<Registry>, uri: &str) -> (StatusCode, ResponseData) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = create_router(registry).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_empty() {
        let (status, body) = call(registry(), "/process").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, 200);
        assert_eq!(body.error, "");
        assert_eq!(body.data, Some(serde_json::json!({})));
    }

    #[tokio::test]
    async fn test_list_reports_labels() {
        let reg = registry();
        reg.create("sleeper", Arc::new(ProcessConfig::new("/bin/sleep").with_args(["30"])))
            .await;
        let (_, body) = call(Arc::clone(&reg), "/process").await;
        let data = body.data.unwrap();
        assert!(data["sleeper"].is_string());

        for p in reg.shutdown().await {
            p.finished().await;
        }
    }

    #[tokio::test]
    async fn test_missing_name_is_rejected() {
        for uri in ["/process/start", "/process/stop?name=", "/process/signal?name=%20%20"] {
            let (status, body) = call(registry(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body.error, "lost process name");
        }
    }

    #[tokio::test]
    async fn test_unknown_name_is_silent() {
        for uri in ["/process/start?name=ghost", "/process/stop?name=ghost", "/process/signal?name=ghost&sig=9"] {
            let (status, body) = call(registry(), uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(body.status, 200);
        }
    }

    #[tokio::test]
    async fn test_bad_signal_value() {
        let (status, body) = call(registry(), "/process/signal?name=x&sig=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("invalid sig"));
    }

    #[test]
    fn test_signal_defaults_to_zero() {
        let q = ProcessQuery { name: Some("x".into()), sig: None };
        assert_eq!(q.signal().unwrap(), 0);
        let q = ProcessQuery { name: Some("x".into()), sig: Some(" ".into()) };
        assert_eq!(q.signal().unwrap(), 0);
        let q = ProcessQuery { name: Some("x".into()), sig: Some("-3".into()) };
        assert_eq!(q.signal().unwrap(), -3);
    }
}
