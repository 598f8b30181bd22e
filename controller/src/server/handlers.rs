//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use openapi_server::models::{
    BulkEnvUpdateRequest, ContainerControlRequest, ContainerControlResponse,
    ContainersInfoResponse, DeploymentDeleteResponse, DeploymentInfoResponse,
    DeploymentTransitionRequest, DeploymentTransitionResponse, EnvUpdateResponse,
    EnvVariablesResponse, PingResponse, VersionResponse,
};
use tracing::{debug, info, warn};

use crate::env::manager::UPDATE_MESSAGE;
use crate::errors::ControllerError;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Liveness check
pub async fn ping_handler() -> impl IntoResponse {
    Json(PingResponse {
        success: true,
        message: "API is operational".to_string(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Deployment metadata and freshly computed state
pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ControllerError> {
    let snapshot = state.machine.status().await?;
    Ok(Json(DeploymentInfoResponse {
        metadata: snapshot.metadata,
        current_state: snapshot.current_state,
        desired_state: snapshot.desired_state,
        last_state_change: snapshot.last_state_change,
        last_transition: snapshot.last_transition,
    }))
}

/// Record a desired state; convergence happens in the background
pub async fn put_deployment_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeploymentTransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControllerError> {
    let Json(request) = payload?;
    let ticket = state
        .machine
        .request_transition(&request.desired_state)
        .await?;

    Ok(Json(DeploymentTransitionResponse {
        success: true,
        desired_state: ticket.desired_state,
        current_state: ticket.previous_state,
        transitioning: true,
        message: format!("Transition to {} started", ticket.desired_state),
        transition_id: ticket.transition_id,
    }))
}

/// Remove containers and volumes
pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ControllerError> {
    let report = state.machine.destroy().await?;
    Ok(Json(DeploymentDeleteResponse {
        success: true,
        message: "Deployment removed".to_string(),
        removed_containers: report.removed_containers,
        removed_volumes: report.removed_volumes,
    }))
}

/// Current variables with their schema
pub async fn get_envs_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(EnvVariablesResponse {
        variables: state.store.variables().await,
    })
}

/// Bulk update of existing variables
pub async fn put_envs_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<BulkEnvUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControllerError> {
    let Json(request) = payload?;
    let update = state
        .env_manager
        .update_variables(&request.variables, request.recreate_services)
        .await?;

    if update.recreation.is_some() {
        info!("Recreation dispatched for {:?}", update.updated);
    }

    Ok(Json(EnvUpdateResponse {
        message: UPDATE_MESSAGE.to_string(),
        updated: update.updated,
    }))
}

/// Every service container
pub async fn list_containers_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ControllerError> {
    let containers = state.containers.list().await?;
    Ok(Json(ContainersInfoResponse { containers }))
}

/// One service container
pub async fn get_container_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ControllerError> {
    let container = state.containers.get(&name).await?;
    Ok(Json(container))
}

/// Start, stop or restart one service container
pub async fn control_container_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    payload: Result<Json<ContainerControlRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControllerError> {
    let Json(request) = payload?;
    let status = state.containers.control(&name, &request.action).await?;

    Ok(Json(ContainerControlResponse {
        success: true,
        container: name,
        message: format!(
            "Container {} is {} after {}",
            status.container_name, status.status, request.action
        ),
        action: request.action,
        status,
    }))
}

/// Follow a container's log over a websocket
///
/// Each log line is one text message. Failures are sent as a JSON error
/// body before the socket closes.
pub async fn container_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_container_logs(socket, state, name))
}

async fn stream_container_logs(mut socket: WebSocket, state: Arc<ServerState>, name: String) {
    let mut lines = match state.containers.logs(&name).await {
        Ok(lines) => lines,
        Err(e) => {
            send_error(&mut socket, &e).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(Ok(line)) => {
                    if socket.send(Message::Text(line.into())).await.is_err() {
                        debug!("Log client of {} went away", name);
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Log stream of {} failed: {}", name, e);
                    send_error(&mut socket, &ControllerError::from(e)).await;
                    break;
                }
                None => {
                    debug!("Log stream of {} ended", name);
                    break;
                }
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Log client of {} closed the connection", name);
                    break;
                }
                Some(Err(e)) => {
                    warn!("Log websocket error for {}: {}", name, e);
                    break;
                }
                _ => {}
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

async fn send_error(socket: &mut WebSocket, err: &ControllerError) {
    match serde_json::to_string(&err.error_response()) {
        Ok(body) => {
            let _ = socket.send(Message::Text(body.into())).await;
        }
        Err(e) => warn!("Unable to encode log stream error: {}", e),
    }
}
