//! Admin API subsystem.
//!
//! # Data Flow
//! ```text
//! GET  /admin/status, /admin/services, /admin/backends/{service}/{server}
//!     → bearer auth → StatusSnapshot (ArcSwap load, never blocks the engine)
//! POST /admin/events
//!     → bearer auth → BackendEvent check → mpsc<Event> → reconciler loop
//! ```
//!
//! # Design Decisions
//! - Read-only view of published state; mutations go through the event queue
//! - Disabled unless `[admin] enabled = true`

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::engine::{Event, SharedStatus};

/// State shared by every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub status: SharedStatus,
    pub events: mpsc::Sender<Event>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(get_services))
        .route("/admin/backends/{service}/{server}", get(get_backend_state))
        .route("/admin/events", post(post_event))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    tracing::info!(address = ?listener.local_addr().ok(), "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
