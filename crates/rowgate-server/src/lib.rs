pub mod collect;
pub mod db;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod routes;
pub mod state;

use axum::routing::{any, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use rowgate_core::config::Config;
use state::AppState;

/// Build the axum Router: the two credential endpoints, the catch-all
/// dispatch route, and permissive CORS. Available separately from `serve`
/// for integration testing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&state.config.login_path, post(routes::login::login))
        .route(&state.config.connect_path, post(routes::connect::connect_login))
        .route(&state.config.api, any(routes::dispatch::dispatch))
        .layer(cors)
        .with_state(state)
}

/// Connect to the store, start the reconnect watchdog, and serve until the
/// process exits.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.port;
    let state = AppState::new(config).await?;
    state.db.clone().spawn_watchdog();

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("rowgate listening on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}
