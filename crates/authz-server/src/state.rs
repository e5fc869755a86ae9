//! Shared application state, handed to every route as `State<Arc<AppState>>`.

use std::sync::Arc;

use authz_core::config::SubjectTypeConfig;
use authz_core::PolicyStore;

use crate::config::ServerConfig;
use crate::cr_store::CrRegistry;

/// Everything a route handler needs: the policy store, the CR registry
/// standing in for the external reconciler cache, and the sorted,
/// validated Subject Detector configuration.
pub struct AppState {
    pub store: PolicyStore,
    pub cr_registry: CrRegistry,
    pub subject_configs: Vec<SubjectTypeConfig>,
    pub config: ServerConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Shared, reference-counted application state.
pub type SharedState = Arc<AppState>;
