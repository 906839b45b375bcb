use super::{AppState, routes};
use crate::Result;
use axum::{
    Router,
    routing::{delete, get},
};
use std::future::Future;
use std::net::SocketAddr;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/jobs",
            get(routes::jobs::list).post(routes::jobs::create),
        )
        .route("/jobs/{event_id}", delete(routes::jobs::remove))
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| miette::miette!("Failed to bind web server to {}: {}", addr, e))?;

    info!("accepting schedule requests on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| miette::miette!("Web server error: {}", e))?;

    Ok(())
}
