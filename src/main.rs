mod config;
mod envelope;
mod ids;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    let port = config.port;
    let state = state::AppState::new(config);

    // Expired pair tokens are reclaimed on a fixed cadence.
    let _reaper = services::pairing::spawn_reaper(state.pairing.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "scrawl listening");
    axum::serve(listener, app).await.expect("server failed");
}
