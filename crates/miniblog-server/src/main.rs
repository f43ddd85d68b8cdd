use clap::Parser;
use miniblog_server::server::telemetry::init_telemetry;
use miniblog_server::{CliArgs, ServerConfig, UnionServer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    // Bind failures surface here, before the lifecycle reaches Running.
    let res = match UnionServer::new(config).await {
        Ok(server) => server.run().await,
        Err(err) => Err(err),
    };

    match &res {
        Ok(()) => tracing::info!("Service shut down successfully"),
        Err(err) => tracing::error!(error = %err, "Service terminated with an error"),
    }
    providers.shutdown();
    Ok(res?)
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting miniblog with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting miniblog in {} mode (grpc {}, http {})",
            config.mode,
            config.grpc_addr,
            config.http_addr
        );
    }
}
