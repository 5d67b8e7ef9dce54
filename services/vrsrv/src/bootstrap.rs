//! Service startup: logging and wiring of the clients into [`AppState`]

use std::sync::Arc;

use anyhow::{Context, Result};
use common::logging::{self, LogConfig};
use common::service_bootstrap::ServiceInfo;
use tracing::info;

use crate::app_state::AppState;
use crate::auth::{ClientCredentialsAuthenticator, TokenProvider};
use crate::config::{VrsrvConfig, DEFAULT_PORT};
use crate::forward::Forwarder;
use crate::jsonapi::JsonApiClient;
use crate::reconcile::Adapter;
use crate::registry::{RegistryClientConfig, VerenigingenClient};
use crate::uri::ContextResolver;

pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        "vrsrv",
        env!("CARGO_PKG_VERSION"),
        "Verenigingsregister adapter",
        DEFAULT_PORT,
    )
}

pub fn init_logging(config: &VrsrvConfig) -> Result<()> {
    logging::init_with_config(LogConfig {
        service_name: config.service.name.clone(),
        level: config.logging.level.clone(),
        log_dir: config.logging.dir.clone(),
        enable_json: config.logging.json,
        ..Default::default()
    })
}

/// Build every client from configuration
pub fn create_app_state(config: VrsrvConfig) -> Result<Arc<AppState>> {
    let authenticator = ClientCredentialsAuthenticator::new(config.auth.clone())
        .context("Failed to create token client")?;
    info!(
        "Token endpoint: {} ({:?})",
        authenticator.token_endpoint(),
        config.auth.environment
    );
    create_app_state_with_tokens(config, Arc::new(authenticator))
}

/// Same as [`create_app_state`] with a caller-supplied token source
pub fn create_app_state_with_tokens(
    config: VrsrvConfig,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Arc<AppState>> {
    let store = JsonApiClient::new(&config.local_store.url, config.local_store.timeout())
        .context("Failed to create local store client")?;
    info!("Local store: {}", store.base_url());

    let registry = VerenigingenClient::new(
        RegistryClientConfig {
            base_url: config.registry.url.clone(),
            api_version: config.registry.api_version.clone(),
            initiator: config.registry.initiator.clone(),
            timeout: config.registry.timeout(),
        },
        tokens.clone(),
    )
    .context("Failed to create registry client")?;
    info!("Registry: {}", config.registry.url);

    let adapter = Adapter::new(
        Arc::new(store),
        Arc::new(registry),
        config.reconcile.conflict_policy,
    );
    info!("Conflict policy: {:?}", adapter.policy());

    let uri_resolver = ContextResolver::new(
        config.uri_cache.max_entries,
        config.uri_cache.ttl(),
        config.uri_cache.timeout(),
    )
    .context("Failed to create context resolver")?;

    let forwarder = Forwarder::new(&config.forward.resources_url, config.forward.timeout())
        .context("Failed to create forwarder")?;
    info!("Forwarding unmatched requests to {}", config.forward.resources_url);

    Ok(Arc::new(AppState::new(
        Arc::new(config),
        adapter,
        tokens,
        uri_resolver,
        forwarder,
    )))
}
