use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::{HostFilter, InstanceRegistry};
use crate::syncthing::aggregator::Aggregator;
use crate::syncthing::client::DaemonClient;
use crate::syncthing::control::{self, ControlAction};
use crate::syncthing::model::Node;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub registry: InstanceRegistry,
    pub http: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodesQuery {
    #[serde(default)]
    pub hosts: HostFilter,
}

#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/nodes: the aggregated view, optionally filtered by host class.
pub async fn nodes(
    State(state): State<AppState>,
    Query(query): Query<NodesQuery>,
) -> Json<NodesResponse> {
    if state.registry.is_empty() {
        return Json(NodesResponse {
            nodes: Vec::new(),
            error: Some("No instances configured".to_string()),
        });
    }

    let batch = state.aggregator.query(query.hosts).await;
    Json(NodesResponse {
        nodes: batch.nodes,
        error: batch.error,
    })
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub node: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    pub action: ControlAction,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// POST /api/pause-resume: pause or resume one folder or one device on one
/// node. The daemon's error message is surfaced verbatim on failure.
pub async fn pause_resume(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, (StatusCode, Json<ErrorBody>)> {
    enum Target<'a> {
        Folder(&'a str),
        Device(&'a str),
    }

    let target = if let Some(folder) = request.folder.as_deref() {
        Target::Folder(folder)
    } else if let Some(device) = request.device.as_deref() {
        Target::Device(device)
    } else {
        return Err(control_error(
            StatusCode::BAD_REQUEST,
            "Missing required parameters".to_string(),
        ));
    };

    let Some(instance) = state.registry.get(&request.node) else {
        return Err(control_error(StatusCode::NOT_FOUND, "Node not found".to_string()));
    };

    // Control writes are not tied to any batch deadline.
    let client = DaemonClient::new(state.http.clone(), instance, CancellationToken::new());
    let pause = request.action.pause();

    let outcome = match target {
        Target::Folder(folder) => control::set_folder_paused(&client, folder, pause)
            .await
            .map_err(|err| format!("Failed to {} folder: {err}", request.action.as_str())),
        Target::Device(device) => control::set_device_paused(&client, device, pause)
            .await
            .map_err(|err| format!("Failed to {} device: {err}", request.action.as_str())),
    };

    match outcome {
        Ok(()) => Ok(Json(ControlResponse { success: true })),
        Err(message) => {
            error!(node = %request.node, %message, "Control action failed");
            Err(control_error(StatusCode::BAD_GATEWAY, message))
        }
    }
}

fn control_error(status: StatusCode, message: String) -> (StatusCode, Json<ErrorBody>) {
    (status, Json(ErrorBody { error: message }))
}
