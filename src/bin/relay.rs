//! Relay server binary
//!
//! Configuration comes from the environment:
//!
//! ```text
//! RELAY_BIND_ADDRESS=0.0.0.0:8080 RUST_LOG=voice_relay=debug voice-relay
//! ```
//!
//! Producers and consumers connect to `ws://<addr>/` and identify themselves
//! with a hello message; `GET /health` and `GET /stats` are served on the
//! same port.

use voice_relay::{shutdown_signal, RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voice_relay=info".parse()?),
        )
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        consumer_queue = config.consumer_queue_capacity,
        "Starting relay"
    );

    let server = RelayServer::bind(config).await?;
    server.run_until(shutdown_signal()).await?;

    Ok(())
}
