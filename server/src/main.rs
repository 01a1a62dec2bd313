use dispatch_server::config::ServerConfig;
use dispatch_server::{build_handler, open_blob_store, session};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::from_env()?;
    info!("Dispatch server starting");
    info!("  Loading timeout: {:?}", config.loading_timeout);
    info!(
        "  Upload limits: {} bytes per image, {} bytes total, {} items",
        config.upload_limits.max_image_bytes,
        config.upload_limits.max_total_bytes,
        config.upload_limits.max_items
    );

    let blob_store = open_blob_store(&config).await?;
    let handler = Arc::new(build_handler(&config, blob_store));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Server listening on {}", listener.local_addr()?);

    tokio::select! {
        result = session::serve(listener, handler.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            let registry = handler.registry();
            info!(
                "Shutting down with {} drones registered: {:?}",
                registry.len().await,
                registry.serial_numbers().await
            );
            Ok(())
        }
    }
}
