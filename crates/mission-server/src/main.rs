use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mission_server::config::ServerConfig;
use mission_server::{build_app, spawn_sources};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("MISSION_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Mission Control starting");

    let config = match ServerConfig::load().and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        },
    };
    let listen_addr = config.listen_addr.clone();
    tracing::info!(
        addr = %listen_addr,
        web_root = %config.web_root,
        agents = config.roster.len(),
        source = ?config.source.kind,
        "Configuration ready"
    );

    let (app, state) = match build_app(config) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        },
    };

    let cancel = CancellationToken::new();
    let sources = spawn_sources(&state, &cancel);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %listen_addr, "Failed to bind: {e}");
            std::process::exit(1);
        },
    };
    tracing::info!(addr = %listen_addr, "Listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
    }

    cancel.cancel();
    for handle in sources {
        let _ = handle.await;
    }
    tracing::info!("Mission Control stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
