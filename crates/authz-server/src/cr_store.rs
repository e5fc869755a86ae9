//! A stand-in for the external declarative-reconciler CR cache (§1: "the
//! declarative reconciler framework and its CR cache" is an external
//! collaborator). This crate still has to answer PAP `Get`/`List` calls and
//! feed the Synchronizer *something*, so it keeps the four CR kinds in a
//! small in-memory registry and fires the matching [`authz_core::sync`]
//! event inline after every mutation — the closest in-process
//! approximation of "the Synchronizer observes the CR client's effects"
//! (§4.H) without actually standing up an informer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use authz_core::error::PapError;
use authz_core::sync::{ClusterRoleBindingSpec, Event, ObjectMeta, RawObject, RoleBindingSpec, RoleSpec};
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::AppError;

type Key = (Option<String>, String);

#[derive(Default)]
struct Table<T> {
    objects: RwLock<HashMap<Key, (ObjectMeta, T)>>,
    system: RwLock<HashSet<Key>>,
}

impl<T: Clone> Table<T> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Option<(ObjectMeta, T)> {
        self.objects.read().await.get(&(namespace.map(ToString::to_string), name.to_string())).cloned()
    }

    async fn list(&self, namespace: Option<&str>) -> Vec<(ObjectMeta, T)> {
        self.objects
            .read()
            .await
            .values()
            .filter(|(meta, _)| namespace.is_none() || meta.namespace.as_deref() == namespace)
            .cloned()
            .collect()
    }

    async fn put(&self, meta: ObjectMeta, spec: T) {
        let key = (meta.namespace.clone(), meta.name.clone());
        self.objects.write().await.insert(key, (meta, spec));
    }

    /// Like [`Table::put`], but marks the object immutable through the PAP
    /// surface (§9 seeded defaults; mirrors the `internal`/`.internal()` tag
    /// the seeder sets on the `PolicyStore` grant/binding rows it writes).
    async fn put_system(&self, meta: ObjectMeta, spec: T) {
        let key = (meta.namespace.clone(), meta.name.clone());
        self.system.write().await.insert(key.clone());
        self.objects.write().await.insert(key, (meta, spec));
    }

    async fn is_system(&self, namespace: Option<&str>, name: &str) -> bool {
        self.system.read().await.contains(&(namespace.map(ToString::to_string), name.to_string()))
    }
}

/// The in-memory CR registry: one table per kind.
#[derive(Default)]
pub struct CrRegistry {
    roles: Table<RoleSpec>,
    cluster_roles: Table<RoleSpec>,
    role_bindings: Table<RoleBindingSpec>,
    cluster_role_bindings: Table<ClusterRoleBindingSpec>,
}

fn next_meta(existing: Option<&ObjectMeta>, name: &str, namespace: Option<&str>) -> ObjectMeta {
    existing.map_or_else(
        || ObjectMeta { name: name.to_string(), namespace: namespace.map(ToString::to_string), uid: uuid::Uuid::new_v4().to_string(), generation: 1 },
        |meta| ObjectMeta { generation: meta.generation + 1, ..meta.clone() },
    )
}

impl CrRegistry {
    /// Register the seeded `super-admin` `ClusterRole`/`ClusterRoleBinding`
    /// as system objects, matching the rows [`authz_core::seeder`] writes
    /// directly to the `PolicyStore` (§4.D/§9). Registered here, not fired
    /// as Synchronizer events, since the seeder has already applied the
    /// equivalent grant/binding rows to the store directly; this only gives
    /// the PAP surface something to `Get`/`List` and to reject mutations of.
    pub async fn seed_system_defaults(&self) {
        use authz_core::seeder::{default_bindings, default_roles};
        use authz_core::sync::{Entitlement, RoleRef, RoleRefKind, TargetPath};

        for role in default_roles() {
            let spec = RoleSpec { actions: role.actions };
            let namespace = role.namespace.as_deref();
            let meta = next_meta(None, &role.name, namespace);
            if namespace.is_some() {
                self.roles.put_system(meta, spec).await;
            } else {
                self.cluster_roles.put_system(meta, spec).await;
            }
        }

        for (idx, binding) in default_bindings().into_iter().enumerate() {
            let name = format!("{}-{idx}", binding.role_name);
            let entitlement = Entitlement { claim: binding.claim, value: binding.value };
            let role_ref = RoleRef { kind: RoleRefKind::ClusterRole, name: binding.role_name };
            let namespace = binding.role_namespace.as_deref();
            let meta = next_meta(None, &name, namespace);
            if namespace.is_some() {
                let spec = RoleBindingSpec {
                    entitlement,
                    target_path: TargetPath::default(),
                    role_ref,
                    effect: binding.effect,
                };
                self.role_bindings.put_system(meta, spec).await;
            } else {
                let spec = ClusterRoleBindingSpec { entitlement, role_ref, effect: binding.effect };
                self.cluster_role_bindings.put_system(meta, spec).await;
            }
        }
    }

    /// Create a `Role`. Errors if one already exists at this name/namespace
    /// (§6/§7: `RoleAlreadyExists` on the wrong verb).
    pub async fn create_role(&self, store: &authz_core::PolicyStore, name: &str, namespace: &str, spec: RoleSpec) -> Result<ObjectMeta, AppError> {
        if self.roles.get(Some(namespace), name).await.is_some() {
            return Err(PapError::RoleAlreadyExists(format!("role '{name}' already exists in namespace '{namespace}'")).into());
        }
        let meta = next_meta(None, name, Some(namespace));
        self.roles.put(meta.clone(), spec.clone()).await;

        let object = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Added { kind: authz_core::sync::CrKind::Role, object }).await;
        Ok(meta)
    }

    /// Update an existing `Role`. Errors if absent (`RoleNotFound`) or
    /// seeded (`SystemMappingImmutable`).
    pub async fn update_role(&self, store: &authz_core::PolicyStore, name: &str, namespace: &str, spec: RoleSpec) -> Result<ObjectMeta, AppError> {
        if self.roles.is_system(Some(namespace), name).await {
            return Err(PapError::SystemMappingImmutable(format!("role '{name}' is a seeded system role and cannot be modified")).into());
        }
        let (old_meta, old_spec) = self
            .roles
            .get(Some(namespace), name)
            .await
            .ok_or_else(|| AppError::from(PapError::RoleNotFound(format!("role '{name}' not found in namespace '{namespace}'"))))?;

        let meta = next_meta(Some(&old_meta), name, Some(namespace));
        self.roles.put(meta.clone(), spec.clone()).await;

        let old = RawObject { meta: old_meta, spec: json!(old_spec) };
        let new = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Updated { kind: authz_core::sync::CrKind::Role, old, new }).await;
        Ok(meta)
    }

    pub async fn get_role(&self, name: &str, namespace: &str) -> Option<(ObjectMeta, RoleSpec)> {
        self.roles.get(Some(namespace), name).await
    }

    pub async fn list_roles(&self, namespace: &str) -> Vec<(ObjectMeta, RoleSpec)> {
        self.roles.list(Some(namespace)).await
    }

    /// Create a `ClusterRole`. Errors if one already exists at this name.
    pub async fn create_cluster_role(&self, store: &authz_core::PolicyStore, name: &str, spec: RoleSpec) -> Result<ObjectMeta, AppError> {
        if self.cluster_roles.get(None, name).await.is_some() {
            return Err(PapError::RoleAlreadyExists(format!("cluster role '{name}' already exists")).into());
        }
        let meta = next_meta(None, name, None);
        self.cluster_roles.put(meta.clone(), spec.clone()).await;

        let object = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Added { kind: authz_core::sync::CrKind::ClusterRole, object }).await;
        Ok(meta)
    }

    /// Update an existing `ClusterRole`. Errors if absent or seeded.
    pub async fn update_cluster_role(&self, store: &authz_core::PolicyStore, name: &str, spec: RoleSpec) -> Result<ObjectMeta, AppError> {
        if self.cluster_roles.is_system(None, name).await {
            return Err(PapError::SystemMappingImmutable(format!("cluster role '{name}' is a seeded system role and cannot be modified")).into());
        }
        let (old_meta, old_spec) =
            self.cluster_roles.get(None, name).await.ok_or_else(|| AppError::from(PapError::RoleNotFound(format!("cluster role '{name}' not found"))))?;

        let meta = next_meta(Some(&old_meta), name, None);
        self.cluster_roles.put(meta.clone(), spec.clone()).await;

        let old = RawObject { meta: old_meta, spec: json!(old_spec) };
        let new = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Updated { kind: authz_core::sync::CrKind::ClusterRole, old, new }).await;
        Ok(meta)
    }

    pub async fn get_cluster_role(&self, name: &str) -> Option<(ObjectMeta, RoleSpec)> {
        self.cluster_roles.get(None, name).await
    }

    pub async fn list_cluster_roles(&self) -> Vec<(ObjectMeta, RoleSpec)> {
        self.cluster_roles.list(None).await
    }

    /// Create a `RoleBinding`. Errors if one already exists at this
    /// name/namespace (`MappingAlreadyExists`).
    pub async fn create_role_binding(&self, store: &authz_core::PolicyStore, name: &str, namespace: &str, spec: RoleBindingSpec) -> Result<ObjectMeta, AppError> {
        if self.role_bindings.get(Some(namespace), name).await.is_some() {
            return Err(PapError::MappingAlreadyExists(format!("role binding '{name}' already exists in namespace '{namespace}'")).into());
        }
        let meta = next_meta(None, name, Some(namespace));
        self.role_bindings.put(meta.clone(), spec.clone()).await;

        let object = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Added { kind: authz_core::sync::CrKind::RoleBinding, object }).await;
        Ok(meta)
    }

    /// Update an existing `RoleBinding`. Errors if absent
    /// (`MappingNotFound`) or seeded (`SystemMappingImmutable`).
    pub async fn update_role_binding(&self, store: &authz_core::PolicyStore, name: &str, namespace: &str, spec: RoleBindingSpec) -> Result<ObjectMeta, AppError> {
        if self.role_bindings.is_system(Some(namespace), name).await {
            return Err(PapError::SystemMappingImmutable(format!("role binding '{name}' is a seeded system mapping and cannot be modified")).into());
        }
        let (old_meta, old_spec) = self
            .role_bindings
            .get(Some(namespace), name)
            .await
            .ok_or_else(|| AppError::from(PapError::MappingNotFound(format!("role binding '{name}' not found in namespace '{namespace}'"))))?;

        let meta = next_meta(Some(&old_meta), name, Some(namespace));
        self.role_bindings.put(meta.clone(), spec.clone()).await;

        let old = RawObject { meta: old_meta, spec: json!(old_spec) };
        let new = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Updated { kind: authz_core::sync::CrKind::RoleBinding, old, new }).await;
        Ok(meta)
    }

    pub async fn get_role_binding(&self, name: &str, namespace: &str) -> Option<(ObjectMeta, RoleBindingSpec)> {
        self.role_bindings.get(Some(namespace), name).await
    }

    pub async fn list_role_bindings(&self, namespace: &str) -> Vec<(ObjectMeta, RoleBindingSpec)> {
        self.role_bindings.list(Some(namespace)).await
    }

    /// Create a `ClusterRoleBinding`. Errors if one already exists at this
    /// name.
    pub async fn create_cluster_role_binding(&self, store: &authz_core::PolicyStore, name: &str, spec: ClusterRoleBindingSpec) -> Result<ObjectMeta, AppError> {
        if self.cluster_role_bindings.get(None, name).await.is_some() {
            return Err(PapError::MappingAlreadyExists(format!("cluster role binding '{name}' already exists")).into());
        }
        let meta = next_meta(None, name, None);
        self.cluster_role_bindings.put(meta.clone(), spec.clone()).await;

        let object = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Added { kind: authz_core::sync::CrKind::ClusterRoleBinding, object }).await;
        Ok(meta)
    }

    /// Update an existing `ClusterRoleBinding`. Errors if absent or seeded.
    pub async fn update_cluster_role_binding(&self, store: &authz_core::PolicyStore, name: &str, spec: ClusterRoleBindingSpec) -> Result<ObjectMeta, AppError> {
        if self.cluster_role_bindings.is_system(None, name).await {
            return Err(PapError::SystemMappingImmutable(format!("cluster role binding '{name}' is a seeded system mapping and cannot be modified")).into());
        }
        let (old_meta, old_spec) = self
            .cluster_role_bindings
            .get(None, name)
            .await
            .ok_or_else(|| AppError::from(PapError::MappingNotFound(format!("cluster role binding '{name}' not found"))))?;

        let meta = next_meta(Some(&old_meta), name, None);
        self.cluster_role_bindings.put(meta.clone(), spec.clone()).await;

        let old = RawObject { meta: old_meta, spec: json!(old_spec) };
        let new = RawObject { meta: meta.clone(), spec: json!(spec) };
        authz_core::sync::handle_event(store, Event::Updated { kind: authz_core::sync::CrKind::ClusterRoleBinding, old, new }).await;
        Ok(meta)
    }

    pub async fn get_cluster_role_binding(&self, name: &str) -> Option<(ObjectMeta, ClusterRoleBindingSpec)> {
        self.cluster_role_bindings.get(None, name).await
    }

    pub async fn list_cluster_role_bindings(&self) -> Vec<(ObjectMeta, ClusterRoleBindingSpec)> {
        self.cluster_role_bindings.list(None).await
    }
}

/// A shared handle to the registry, stored alongside [`crate::state::AppState`].
pub type SharedCrRegistry = Arc<CrRegistry>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use authz_core::config::CacheConfig;
    use authz_core::PolicyStore;
    use authz_store::{MemoryBackend, PolicyBackend};
    use std::sync::Arc as StdArc;

    fn store() -> PolicyStore {
        let backend: StdArc<dyn PolicyBackend> = StdArc::new(MemoryBackend::new());
        PolicyStore::new(backend, CacheConfig::default())
    }

    #[tokio::test]
    async fn create_role_twice_is_rejected() {
        let registry = CrRegistry::default();
        let store = store();
        let spec = RoleSpec { actions: vec!["component:view".to_string()] };

        registry.create_role(&store, "viewer", "acme", spec.clone()).await.unwrap();
        let err = registry.create_role(&store, "viewer", "acme", spec).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_nonexistent_role_is_rejected() {
        let registry = CrRegistry::default();
        let store = store();
        let spec = RoleSpec { actions: vec!["component:view".to_string()] };

        let err = registry.update_role(&store, "ghost", "acme", spec).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_role_after_create_succeeds_and_bumps_generation() {
        let registry = CrRegistry::default();
        let store = store();
        let spec = RoleSpec { actions: vec!["component:view".to_string()] };
        let created = registry.create_role(&store, "viewer", "acme", spec).await.unwrap();
        assert_eq!(created.generation, 1);

        let updated_spec = RoleSpec { actions: vec!["component:view".to_string(), "component:deploy".to_string()] };
        let updated = registry.update_role(&store, "viewer", "acme", updated_spec).await.unwrap();
        assert_eq!(updated.generation, 2);
    }

    #[tokio::test]
    async fn seeded_cluster_role_is_immutable() {
        let registry = CrRegistry::default();
        let store = store();
        registry.seed_system_defaults().await;

        let (_, spec) = registry.get_cluster_role("super-admin").await.unwrap();
        let err = registry.update_cluster_role(&store, "super-admin", spec).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
