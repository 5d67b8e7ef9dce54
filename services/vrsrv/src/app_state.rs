//! Shared state handed to every handler

use std::sync::Arc;

use crate::auth::TokenProvider;
use crate::config::VrsrvConfig;
use crate::forward::Forwarder;
use crate::reconcile::Adapter;
use crate::uri::ContextResolver;

pub struct AppState {
    pub config: Arc<VrsrvConfig>,

    /// Address update/delete orchestration
    pub adapter: Adapter,

    /// Registry token source; its health backs `/health`
    pub tokens: Arc<dyn TokenProvider>,

    pub uri_resolver: ContextResolver,

    /// Fallback pass-through to the resources service
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(
        config: Arc<VrsrvConfig>,
        adapter: Adapter,
        tokens: Arc<dyn TokenProvider>,
        uri_resolver: ContextResolver,
        forwarder: Forwarder,
    ) -> Self {
        Self {
            config,
            adapter,
            tokens,
            uri_resolver,
            forwarder,
        }
    }
}
