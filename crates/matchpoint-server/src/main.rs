use std::path::Path;

use tracing_subscriber::EnvFilter;

use matchpoint_server::build_app;
use matchpoint_server::config::ServerConfig;
use matchpoint_server::scheduler::spawn_timeout_scheduler;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "matchpoint.toml".to_string());
    let config = ServerConfig::load(Path::new(&config_path));
    config.validate();

    let listen_addr = config.listen_addr.clone();
    let (app, state) = build_app(config);
    spawn_timeout_scheduler(state);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind listen address");
            std::process::exit(1);
        },
    };
    tracing::info!(addr = %listen_addr, "Matchpoint server listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}
