use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::admin::AdminState;
use crate::engine::{BackendEvent, Event, ServiceStatus};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: &'static str,
    pub fingerprint: Option<String>,
    pub last_pass: Option<crate::engine::PassSummary>,
    pub backends: usize,
    pub orphaned: usize,
    pub services: usize,
}

#[derive(Serialize)]
pub struct Accepted {
    pub accepted: &'static str,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.status.load();
    let status = match &snapshot.last_pass {
        Some(pass) if !pass.ok => "degraded",
        _ => "operational",
    };
    Json(SystemStatus {
        version: snapshot.version.clone(),
        status,
        fingerprint: snapshot.fingerprint.clone(),
        last_pass: snapshot.last_pass.clone(),
        backends: snapshot.backends,
        orphaned: snapshot.orphaned,
        services: snapshot.services.len(),
    })
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    Json(state.status.load().services.clone())
}

/// Plain `active`/`backup` token for one rendered server.
pub async fn get_backend_state(
    State(state): State<AdminState>,
    Path((service, server)): Path<(String, String)>,
) -> Response {
    match state.status.load().backend_state(&service, &server) {
        Some(backend_state) => backend_state.as_str().into_response(),
        None => (StatusCode::NOT_FOUND, "unknown backend").into_response(),
    }
}

/// Queue a backend event for the reconciler.
pub async fn post_event(
    State(state): State<AdminState>,
    Json(event): Json<BackendEvent>,
) -> Response {
    if let Err(reason) = event.check() {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    let kind = event.kind();
    match state.events.try_send(Event::Backend(event)) {
        Ok(()) => {
            tracing::debug!(event = kind, "Queued backend event");
            (StatusCode::ACCEPTED, Json(Accepted { accepted: kind })).into_response()
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!(event = kind, "Event queue full, rejecting");
            (StatusCode::SERVICE_UNAVAILABLE, "event queue full").into_response()
        }
        Err(TrySendError::Closed(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "reconciler stopped").into_response()
        }
    }
}
