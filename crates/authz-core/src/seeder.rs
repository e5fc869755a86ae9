//! Seeder (§4.D): populates a freshly-opened store with the built-in
//! default actions, role grants, and bindings, idempotently.

use authz_store::{ActionRow, BindingRow, GrantRow};

use crate::catalog::{default_actions, Action};
use crate::error::SeederError;
use crate::matcher::{hierarchy_to_path, ResourceHierarchy, WILDCARD};
use crate::store::PolicyStore;

/// A default role: its grants and the bindings that reach it.
///
/// This is the "single well-defined source" the design notes call for
/// (§9): one function, [`default_seed_data`], rather than two competing
/// embedded files.
#[derive(Debug, Clone)]
pub struct DefaultRole {
    pub name: String,
    pub namespace: Option<String>,
    pub actions: Vec<String>,
}

/// A default binding: entitlement, hierarchy, role reference, and effect.
#[derive(Debug, Clone)]
pub struct DefaultBinding {
    pub claim: String,
    pub value: String,
    pub hierarchy: ResourceHierarchy,
    pub role_name: String,
    pub role_namespace: Option<String>,
    pub effect: String,
}

/// The single well-defined seed source (§9 open question), resolving the
/// divergence between "one `super-admin` role" and "many roles" revisions
/// in favor of a minimal, end-to-end-scenario-covering default: a
/// cluster-scoped `super-admin` role granted every action (`*`) and bound
/// to `groups:admin` across the whole hierarchy (`*`), matching S1 (§8).
#[must_use]
pub fn default_roles() -> Vec<DefaultRole> {
    vec![DefaultRole {
        name: "super-admin".to_string(),
        namespace: None,
        actions: vec![WILDCARD.to_string()],
    }]
}

#[must_use]
pub fn default_bindings() -> Vec<DefaultBinding> {
    vec![DefaultBinding {
        claim: "groups".to_string(),
        value: "admin".to_string(),
        hierarchy: ResourceHierarchy::default(),
        role_name: "super-admin".to_string(),
        role_namespace: None,
        effect: "allow".to_string(),
    }]
}

fn role_namespace_token(namespace: Option<&str>) -> String {
    namespace.filter(|ns| !ns.is_empty()).map_or_else(|| WILDCARD.to_string(), ToString::to_string)
}

/// Run the seeder against `store`: insert actions, then role grants, then
/// bindings, in that order, all insert-on-conflict-do-nothing (§4.D).
/// Re-running on an already-seeded store is a no-op (returns the counts of
/// rows actually inserted, which are `0` on a second run — invariant 5,
/// §8).
///
/// # Errors
/// Returns [`SeederError`] if any batch write fails.
pub async fn seed(store: &PolicyStore, actions: &[Action]) -> Result<SeedSummary, SeederError> {
    let action_rows: Vec<ActionRow> = actions.iter().map(|a| ActionRow::new(a.name.clone(), a.is_internal)).collect();
    let actions_inserted = store.backend().seed_actions(&action_rows).await.map_err(crate::error::StoreError::from)?;

    let mut grant_rows = Vec::new();
    for role in default_roles() {
        let namespace = role_namespace_token(role.namespace.as_deref());
        for action in &role.actions {
            grant_rows.push(GrantRow::new(role.name.clone(), action.clone(), namespace.clone()).internal());
        }
    }
    let grants_inserted = store.backend().seed_grants(&grant_rows).await.map_err(crate::error::StoreError::from)?;

    let mut binding_rows = Vec::new();
    for binding in default_bindings() {
        let subject = format!("{}:{}", binding.claim, binding.value);
        let resource = hierarchy_to_path(&binding.hierarchy);
        let role_namespace = role_namespace_token(binding.role_namespace.as_deref());
        binding_rows.push(
            BindingRow::new(subject, resource, binding.role_name.clone(), role_namespace, binding.effect.clone(), String::new())
                .internal(),
        );
    }
    let bindings_inserted = store.backend().seed_bindings(&binding_rows).await.map_err(crate::error::StoreError::from)?;

    let summary = SeedSummary {
        actions_inserted,
        grants_inserted,
        bindings_inserted,
    };
    tracing::info!(
        actions_inserted = summary.actions_inserted,
        grants_inserted = summary.grants_inserted,
        bindings_inserted = summary.bindings_inserted,
        "policy store seeded"
    );
    Ok(summary)
}

/// Convenience wrapper seeding the built-in default actions.
///
/// # Errors
/// Returns [`SeederError`] if any batch write fails.
pub async fn seed_defaults(store: &PolicyStore) -> Result<SeedSummary, SeederError> {
    seed(store, &default_actions()).await
}

/// Row counts from one seeder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub actions_inserted: u64,
    pub grants_inserted: u64,
    pub bindings_inserted: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use authz_store::{MemoryBackend, PolicyBackend};

    use super::*;
    use crate::config::CacheConfig;

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let backend: Arc<dyn PolicyBackend> = Arc::new(MemoryBackend::new());
        let store = PolicyStore::new(backend, CacheConfig::default());

        let first = seed_defaults(&store).await.unwrap();
        assert!(first.actions_inserted > 0);
        assert_eq!(first.grants_inserted, 1);
        assert_eq!(first.bindings_inserted, 1);

        let second = seed_defaults(&store).await.unwrap();
        assert_eq!(second.actions_inserted, 0);
        assert_eq!(second.grants_inserted, 0);
        assert_eq!(second.bindings_inserted, 0);
    }

    #[tokio::test]
    async fn seeded_super_admin_allows_everything() {
        let backend: Arc<dyn PolicyBackend> = Arc::new(MemoryBackend::new());
        let store = PolicyStore::new(backend, CacheConfig::default());
        seed_defaults(&store).await.unwrap();

        let outcome = store.enforce("groups:admin", "ns/acme", "component:view", "").await.unwrap();
        assert!(outcome.matched_allow);
    }
}
