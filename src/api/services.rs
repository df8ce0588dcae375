//! Service management REST endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::error_response;
use crate::Error;
use crate::services::manager::SharedServiceManager;
use crate::services::{Definition, ServiceId, Status};

/// Build service management routes
pub fn router(manager: SharedServiceManager) -> Router {
    Router::new()
        .route("/api/v1/services", get(list_services))
        .route("/api/v1/services/{id}/status", get(service_status))
        .route("/api/v1/services/{id}/restart", post(restart_service))
        .route("/api/v1/services/{id}/reload/{component}", post(reload_service))
        .with_state(manager)
}

/// Reload acknowledgement
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub service_id: ServiceId,
    pub component: String,
    pub reloaded: bool,
}

/// Library error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();

        let (status, code) = match &self.0 {
            Error::ServiceNotFound(_) => (StatusCode::NOT_FOUND, "service_not_found"),
            Error::ComponentNotFound { .. } => (StatusCode::NOT_FOUND, "component_not_found"),
            Error::Throttled { .. } => (StatusCode::TOO_MANY_REQUESTS, "throttled"),
            Error::Transport(_) | Error::Http(_) => (StatusCode::BAD_GATEWAY, "transport_error"),
            Error::Process(_) => (StatusCode::SERVICE_UNAVAILABLE, "process_error"),
            Error::Config(_) | Error::Toml(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::Io(_) | Error::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "service operation failed");
        }

        let mut response = error_response(status, code, message);
        if let Error::Throttled { retry_after_secs } = self.0 {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Unparseable identities are reported the same way as unknown ones
fn parse_id(raw: &str) -> Result<ServiceId, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError(Error::ServiceNotFound(raw.to_string())))
}

/// List every registered service
async fn list_services(State(manager): State<SharedServiceManager>) -> Json<Vec<Definition>> {
    Json(manager.definitions().await)
}

/// Current status of one service
async fn service_status(
    State(manager): State<SharedServiceManager>,
    Path(id): Path<String>,
) -> Result<Json<Status>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(manager.status(&id).await?))
}

/// Restart one service, subject to the restart cooldown
async fn restart_service(
    State(manager): State<SharedServiceManager>,
    Path(id): Path<String>,
) -> Result<Json<Definition>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(manager.restart(&id).await?))
}

/// Reload a single declared component of one service
async fn reload_service(
    State(manager): State<SharedServiceManager>,
    Path((id, component)): Path<(String, String)>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let service_id = parse_id(&id)?;
    manager.reload(&service_id, &component).await?;

    Ok(Json(ReloadResponse {
        service_id,
        component,
        reloaded: true,
    }))
}
