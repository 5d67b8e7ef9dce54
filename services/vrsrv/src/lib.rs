//! vrsrv - verenigingsregister adapter
//!
//! Accepts JSON:API writes on local `addresses`, finds the registry
//! association that owns each address, checks the stored address against the
//! registry's primary location and pushes the change to the registry before
//! applying it locally. Requests the adapter does not handle are forwarded to
//! the resources service.

pub mod api;
pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod conflict;
pub mod forward;
pub mod jsonapi;
pub mod location;
pub mod mapping;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod routes;
pub mod uri;

#[cfg(test)]
pub(crate) mod testing;

pub use app_state::AppState;
pub use config::VrsrvConfig;
pub use reconcile::{Adapter, ConflictPolicy, ReconcileError};
