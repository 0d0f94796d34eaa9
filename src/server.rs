//! HTTP surface of the service, built on Axum.
//!
//! Routes:
//! - `POST /sign-payment`: run a split payment
//! - `GET /supported`: chains, tokens and commission rate
//! - `GET /health`: liveness
//! - `GET /`: service description

use crate::errors::PaymentError;
use crate::orchestrator::PaymentOrchestrator;
use crate::response::{format_error, format_success, format_supported};
use crate::types::{Chain, ErrorResponse, PaymentRequest, PaymentStage, OWNER_KEY_HEADER};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Name reported by the informational endpoints.
pub const SERVICE_NAME: &str = "split-pay";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator running every payment
    pub orchestrator: Arc<PaymentOrchestrator>,
}

/// Builds the router with tracing and CORS layers.
pub fn router(orchestrator: Arc<PaymentOrchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/", get(root_handler))
        .route("/sign-payment", post(sign_payment_handler))
        .route("/supported", get(supported_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves the router until the process is stopped.
pub async fn serve(
    addr: &str,
    orchestrator: Arc<PaymentOrchestrator>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(orchestrator)).await
}

async fn sign_payment_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let body = ErrorResponse {
                success: false,
                error: "invalid_request".to_string(),
                message: rejection.body_text(),
                tx_hash_commission: None,
                explorer_url_commission: None,
                tx_hash: None,
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let credential = headers
        .get(OWNER_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let orchestrator = &state.orchestrator;
    let (outcome, stages) = orchestrator.execute_traced(credential, &request).await;
    match outcome {
        Ok(result) => {
            let response = format_success(&result, orchestrator.config());
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => error_response(&err, &stages, &request, orchestrator),
    }
}

fn error_response(
    err: &PaymentError,
    stages: &[PaymentStage],
    request: &PaymentRequest,
    orchestrator: &PaymentOrchestrator,
) -> Response {
    let explorer = request
        .chain
        .as_deref()
        .and_then(|c| c.parse::<Chain>().ok())
        .and_then(|chain| orchestrator.config().explorer_url(chain));

    let (status, body) = format_error(err, explorer);
    if status.is_server_error() {
        tracing::error!(
            error = %err,
            category = %body.error,
            stages = ?stages,
            "Payment request failed"
        );
    }
    (status, Json(body)).into_response()
}

async fn supported_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(format_supported(state.orchestrator.config()))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/sign-payment": "POST - Split a payment into commission and merchant transfers",
            "/supported": "GET - List supported chains and tokens",
            "/health": "GET - Health check"
        },
    }))
}
