//! Policy Store (§4.B): wraps a [`PolicyBackend`] with the matching logic
//! that turns raw tuples into an enforcement outcome, plus an optional
//! write-through cache keyed by the full request tuple.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use authz_store::{BindingField, BindingRow, GrantField, GrantRow, PolicyBackend};
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::matcher::{action_match, ctx_match, resource_match};

/// The result of evaluating all bindings matching a `(subject, resource,
/// action, context)` request: whether any matching binding/grant pair had
/// `effect = deny`, and whether any had `effect = allow` (§4.G step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnforceOutcome {
    pub matched_deny: bool,
    pub matched_allow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    subject: String,
    resource: String,
    action: String,
    context: String,
}

struct CacheEntry {
    outcome: EnforceOutcome,
    expires_at: Instant,
}

/// A policy store: the pairing of a [`PolicyBackend`] with the §4.C
/// matcher-driven enforce algorithm and an optional TTL cache over it.
pub struct PolicyStore {
    backend: Arc<dyn PolicyBackend>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    cache_config: CacheConfig,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("cache_enabled", &self.cache_config.enabled)
            .finish_non_exhaustive()
    }
}

impl PolicyStore {
    #[must_use]
    pub fn new(backend: Arc<dyn PolicyBackend>, cache_config: CacheConfig) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            cache_config,
        }
    }

    /// The underlying backend, for the seeder and synchronizer.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn PolicyBackend> {
        &self.backend
    }

    async fn invalidate_cache(&self) {
        if self.cache_config.enabled {
            self.cache.write().await.clear();
            tracing::debug!("policy store cache invalidated");
        }
    }

    /// `AddGrant` (§4.B). Invalidates the cache on success.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend write fails.
    pub async fn add_grant(&self, row: &GrantRow) -> Result<bool, StoreError> {
        let added = self.backend.add_grant(row).await?;
        if added {
            self.invalidate_cache().await;
        }
        Ok(added)
    }

    /// `RemoveGrant` (§4.B). Invalidates the cache on success.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend write fails.
    pub async fn remove_grant(&self, row: &GrantRow) -> Result<bool, StoreError> {
        let removed = self.backend.remove_grant(row).await?;
        if removed {
            self.invalidate_cache().await;
        }
        Ok(removed)
    }

    /// `HasGrant` (§4.B).
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn has_grant(&self, row: &GrantRow) -> Result<bool, StoreError> {
        Ok(self.backend.has_grant(row).await?)
    }

    /// `AddBinding` (§4.B). Invalidates the cache on success.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend write fails.
    pub async fn add_binding(&self, row: &BindingRow) -> Result<bool, StoreError> {
        let added = self.backend.add_binding(row).await?;
        if added {
            self.invalidate_cache().await;
        }
        Ok(added)
    }

    /// `RemoveBinding` (§4.B). Invalidates the cache on success.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend write fails.
    pub async fn remove_binding(&self, row: &BindingRow) -> Result<bool, StoreError> {
        let removed = self.backend.remove_binding(row).await?;
        if removed {
            self.invalidate_cache().await;
        }
        Ok(removed)
    }

    /// `HasBinding` (§4.B).
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn has_binding(&self, row: &BindingRow) -> Result<bool, StoreError> {
        Ok(self.backend.has_binding(row).await?)
    }

    /// `UpdateBinding` (§4.B). Invalidates the cache on success.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend write fails.
    pub async fn update_binding(&self, old: &BindingRow, new: &BindingRow) -> Result<bool, StoreError> {
        let replaced = self.backend.update_binding(old, new).await?;
        if replaced {
            self.invalidate_cache().await;
        }
        Ok(replaced)
    }

    /// `GetFilteredGrants` (§4.B).
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn filtered_grants(&self, field: GrantField, value: &str) -> Result<Vec<GrantRow>, StoreError> {
        Ok(self.backend.filtered_grants(field, value).await?)
    }

    /// `GetFilteredBindings` (§4.B).
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn filtered_bindings(&self, field: BindingField, value: &str) -> Result<Vec<BindingRow>, StoreError> {
        Ok(self.backend.filtered_bindings(field, value).await?)
    }

    /// All bindings for a subject, used by `SubjectProfile` (§4.G).
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn bindings_for_subject(&self, subject: &str) -> Result<Vec<BindingRow>, StoreError> {
        self.filtered_bindings(BindingField::Subject, subject).await
    }

    async fn cache_get(&self, key: &CacheKey) -> Option<EnforceOutcome> {
        if !self.cache_config.enabled {
            return None;
        }
        let cache = self.cache.read().await;
        cache.get(key).filter(|entry| entry.expires_at > Instant::now()).map(|entry| entry.outcome)
    }

    async fn cache_put(&self, key: CacheKey, outcome: EnforceOutcome) {
        if !self.cache_config.enabled {
            return;
        }
        let expires_at = Instant::now() + self.cache_config.ttl;
        self.cache.write().await.insert(key, CacheEntry { outcome, expires_at });
    }

    /// `Enforce` (§4.B/§4.C): evaluates every binding tuple for `subject`
    /// whose resource and context match the request against every grant
    /// reachable from that binding's `(role, role_namespace)` whose action
    /// matches. Returns whether any matching pair had each effect; the
    /// caller (the PDP) applies deny-overrides across subject values.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn enforce(&self, subject: &str, resource: &str, action: &str, context: &str) -> Result<EnforceOutcome, StoreError> {
        let key = CacheKey {
            subject: subject.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            context: context.to_string(),
        };
        if let Some(cached) = self.cache_get(&key).await {
            return Ok(cached);
        }

        let bindings = self.backend.filtered_bindings(BindingField::Subject, subject).await?;
        let mut outcome = EnforceOutcome::default();

        for binding in &bindings {
            if !resource_match(resource, &binding.resource) {
                continue;
            }
            if !ctx_match(context, &binding.context) {
                continue;
            }

            let grants = self.backend.filtered_grants(GrantField::Role, &binding.role).await?;
            for grant in &grants {
                if grant.namespace != binding.namespace {
                    continue;
                }
                if !action_match(action, &grant.action) {
                    continue;
                }
                match binding.effect.as_str() {
                    "deny" => outcome.matched_deny = true,
                    "allow" => outcome.matched_allow = true,
                    _ => {}
                }
            }
        }

        self.cache_put(key, outcome).await;
        Ok(outcome)
    }

    /// Cache TTL and enablement, for diagnostics (`/healthz`).
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        self.cache_config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use authz_store::MemoryBackend;

    fn store_with(ttl_enabled: bool) -> PolicyStore {
        let backend: Arc<dyn PolicyBackend> = Arc::new(MemoryBackend::new());
        let cache_config = CacheConfig { enabled: ttl_enabled, ttl: Duration::from_secs(60) };
        PolicyStore::new(backend, cache_config)
    }

    #[tokio::test]
    async fn enforce_allows_on_matching_grant_and_binding() {
        let store = store_with(false);
        store.add_grant(&GrantRow::new("editor", "component:view", "acme")).await.unwrap();
        store.add_binding(&BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();

        let outcome = store.enforce("groups:devs", "ns/acme", "component:view", "").await.unwrap();
        assert!(outcome.matched_allow);
        assert!(!outcome.matched_deny);
    }

    #[tokio::test]
    async fn enforce_deny_overrides_allow() {
        let store = store_with(false);
        store.add_grant(&GrantRow::new("editor", "component:*", "acme")).await.unwrap();
        store.add_binding(&BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();
        store.add_binding(&BindingRow::new("groups:devs", "ns/acme/project/secret", "editor", "acme", "deny", "")).await.unwrap();

        let outcome = store.enforce("groups:devs", "ns/acme/project/secret/component/c1", "component:deploy", "").await.unwrap();
        assert!(outcome.matched_deny);
        assert!(outcome.matched_allow);
    }

    #[tokio::test]
    async fn enforce_no_match_yields_neither() {
        let store = store_with(false);
        let outcome = store.enforce("groups:devs", "ns/acme", "component:view", "").await.unwrap();
        assert!(!outcome.matched_allow);
        assert!(!outcome.matched_deny);
    }

    #[tokio::test]
    async fn cache_invalidates_on_mutation() {
        let store = store_with(true);
        store.add_grant(&GrantRow::new("editor", "component:view", "acme")).await.unwrap();
        store.add_binding(&BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();

        let first = store.enforce("groups:devs", "ns/acme", "component:view", "").await.unwrap();
        assert!(first.matched_allow);

        store.remove_binding(&BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();
        let second = store.enforce("groups:devs", "ns/acme", "component:view", "").await.unwrap();
        assert!(!second.matched_allow);
    }
}
