pub mod openapi;
pub mod routes;
pub mod socket;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use lens_core::bundle::SourceBundler;
use lens_core::AnalysisPipeline;
use lens_events::EventBus;
use socket::SocketRegistry;

#[derive(Clone)]
pub struct AppState {
    pub bundler: SourceBundler,
    pub pipeline: Arc<AnalysisPipeline>,
    pub event_bus: EventBus,
    pub sockets: SocketRegistry,
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::repos::router(state.clone()))
        .merge(routes::files::router(state.clone()))
        .merge(routes::analyze::router(state.clone()))
        .merge(socket::router(state));

    Router::new()
        .nest("/api", api)
        .merge(openapi::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app(state)).await
}
