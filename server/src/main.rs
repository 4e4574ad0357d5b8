use greennet_server::config::ServerConfig;
use greennet_server::http::{router, AppState};
use greennet_server::janitor::run_janitor;
use greennet_server::relay::Relay;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let relay = Arc::new(Relay::new(&config));

    // Spawn janitor
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let janitor = tokio::spawn(run_janitor(
        Arc::clone(&relay),
        config.janitor_period,
        shutdown_rx,
    ));

    let app = router(
        AppState {
            relay,
            wire_format: config.wire_format,
        },
        config.client_script.as_deref(),
    );

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Starting greennet relay on {} (poll timeout {:?}, idle timeout {:?})",
        config.listen_addr,
        config.poll_timeout,
        config.idle_timeout
    );
    println!("Greennet relay listening on {}", config.listen_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await;

    let _ = shutdown_tx.send(true);
    let _ = janitor.await;

    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
