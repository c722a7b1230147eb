mod handlers;
mod state;
pub mod upstream;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

pub use handlers::ApiError;
pub use state::AppState;

use crate::config::Settings;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/geo/ip", get(handlers::geo_ip))
        .route("/api/geo/reverse", get(handlers::geo_reverse))
        .route("/api/convert", get(handlers::convert))
        .route("/api/currencies", get(handlers::currencies))
        .route("/api/shipping-context", get(handlers::shipping_context))
        .route("/api/location", post(handlers::set_location))
        .route("/api/location/refresh", post(handlers::refresh_location))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bootstrap the visitor session, then serve until the listener fails.
pub async fn start(settings: &Settings) -> std::io::Result<()> {
    let state = Arc::new(AppState::from_settings(settings));
    if let Err(e) = state.session.lock().await.init().await {
        warn!(error = %e, "location session failed to initialize");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;

    info!(addr = %settings.bind_addr, "storefront server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
