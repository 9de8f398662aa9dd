use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::NetworkConfig;
use crate::controller::WifiController;
use crate::error::WifiError;
use crate::machine::{ActionFailure, ActionResult};
use crate::network::{NetworkId, RadioMode};

pub struct ServerConfig {
    pub port: u16,
}

/// Serves the control API until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    controller: WifiController,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(controller).layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

pub fn router(controller: WifiController) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/scan-results", get(scan_results))
        .route("/scan", post(start_scan))
        .route("/networks", get(networks).post(add_network))
        .route("/networks/:id", delete(remove_network))
        .route("/networks/:id/connect", post(connect_network))
        .route("/disconnect", post(disconnect))
        .route("/reconnect", post(reconnect))
        .route("/mode", put(set_mode))
        .with_state(controller)
}

/// Error body for failed API calls.
struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<WifiError>() {
            Some(WifiError::ControllerStopped) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %self.0, "API request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn status(State(ctrl): State<WifiController>) -> ApiResult<Response> {
    Ok(Json(ctrl.status().await?).into_response())
}

async fn metrics(State(ctrl): State<WifiController>) -> ApiResult<Response> {
    Ok(Json(ctrl.metrics().await?).into_response())
}

async fn scan_results(State(ctrl): State<WifiController>) -> ApiResult<Response> {
    Ok(Json(ctrl.scan_results().await?).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct ScanRequest {
    #[serde(default)]
    channels: Option<Vec<u32>>,
}

async fn start_scan(
    State(ctrl): State<WifiController>,
    body: Option<Json<ScanRequest>>,
) -> ApiResult<StatusCode> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    ctrl.start_scan(request.channels)?;
    Ok(StatusCode::ACCEPTED)
}

async fn networks(State(ctrl): State<WifiController>) -> ApiResult<Response> {
    Ok(Json(ctrl.configured_networks().await?).into_response())
}

async fn add_network(
    State(ctrl): State<WifiController>,
    Json(network): Json<NetworkConfig>,
) -> ApiResult<Response> {
    let response = match ctrl.add_or_update_network(network.to_saved_network()).await? {
        Some(result) => (StatusCode::OK, Json(json!(result))).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid network" })),
        )
            .into_response(),
    };
    Ok(response)
}

fn found(ok: bool) -> StatusCode {
    if ok { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND }
}

async fn remove_network(
    State(ctrl): State<WifiController>,
    Path(id): Path<NetworkId>,
) -> ApiResult<StatusCode> {
    Ok(found(ctrl.remove_network(id).await?))
}

async fn connect_network(
    State(ctrl): State<WifiController>,
    Path(id): Path<NetworkId>,
) -> ApiResult<Response> {
    let result = ctrl.connect_network(id).await?;
    let status = match result {
        ActionResult::Succeeded => StatusCode::OK,
        ActionResult::Failed(ActionFailure::InvalidArgs) => StatusCode::NOT_FOUND,
        ActionResult::Failed(ActionFailure::Busy) => StatusCode::CONFLICT,
        ActionResult::Failed(ActionFailure::Error) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok((status, Json(result)).into_response())
}

async fn disconnect(State(ctrl): State<WifiController>) -> ApiResult<StatusCode> {
    ctrl.disconnect()?;
    Ok(StatusCode::ACCEPTED)
}

async fn reconnect(State(ctrl): State<WifiController>) -> ApiResult<StatusCode> {
    ctrl.reconnect()?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: RadioMode,
}

async fn set_mode(
    State(ctrl): State<WifiController>,
    Json(request): Json<ModeRequest>,
) -> ApiResult<StatusCode> {
    ctrl.set_mode(request.mode)?;
    Ok(StatusCode::ACCEPTED)
}
