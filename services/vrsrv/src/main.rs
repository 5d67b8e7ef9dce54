//! vrsrv entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::service_bootstrap::{
    load_development_env, print_startup_banner, shutdown_signal,
};
use tracing::{error, info};

use vrsrv::auth::{ClientCredentialsAuthenticator, TokenProvider};
use vrsrv::bootstrap::{create_app_state, create_service_info, init_logging};
use vrsrv::routes::create_routes;
use vrsrv::VrsrvConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "vrsrv - verenigingsregister adapter")]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", env = "VRSRV_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate configuration and request a registry token
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_development_env();
    let args = Args::parse();

    let config = VrsrvConfig::load(args.config.as_deref())?;
    init_logging(&config)?;

    match args.command {
        Some(Commands::Check) => check(config).await,
        None => run_service(config).await,
    }
}

async fn run_service(config: VrsrvConfig) -> Result<()> {
    let service_info = create_service_info();
    print_startup_banner(&service_info);

    let bind_address = config.bind_address();
    let state = create_app_state(config)?;
    let app = create_routes(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopped");
    Ok(())
}

async fn check(config: VrsrvConfig) -> Result<()> {
    info!("Configuration OK");
    info!("  local store: {}", config.local_store.url);
    info!("  registry:    {}", config.registry.url);
    info!("  forward:     {}", config.forward.resources_url);

    let authenticator = ClientCredentialsAuthenticator::new(config.auth.clone())?;
    info!("  token:       {}", authenticator.token_endpoint());

    match authenticator.access_token().await {
        Ok(_) => {
            info!("Token acquired");
            Ok(())
        },
        Err(e) => {
            error!("Token request failed: {}", e);
            Err(e.into())
        },
    }
}
