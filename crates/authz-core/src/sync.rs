//! Policy Synchronizer (§4.F): converts CR add/update/delete events into
//! incremental Policy Store mutations.
//!
//! The CR cache and reconciler framework that produces these events are
//! external collaborators (§1); this module only defines the CR shapes it
//! needs (bit-significant fields, §6) and the event-to-mutation mapping.
//! Handler failures never propagate past this module (§4.F/§7) — they are
//! logged at `warn!` and the store is left exactly as it was.

use authz_store::{BindingRow, GrantRow};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, SyncError};
use crate::matcher::{hierarchy_to_path, ResourceHierarchy, WILDCARD};
use crate::store::PolicyStore;

/// Opaque per-object metadata carried by every CR event (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: String,
    pub generation: i64,
}

/// `Role.spec` / `ClusterRole.spec` (§6): both carry only `actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    pub actions: Vec<String>,
}

/// `spec.entitlement` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub claim: String,
    pub value: String,
}

/// `spec.target_path` (§6): present only on namespace-scoped `RoleBinding`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetPath {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
}

/// `spec.role_ref.kind` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleRefKind {
    Role,
    ClusterRole,
}

/// `spec.role_ref` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRef {
    pub kind: RoleRefKind,
    pub name: String,
}

/// `RoleBinding.spec` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBindingSpec {
    pub entitlement: Entitlement,
    #[serde(default)]
    pub target_path: TargetPath,
    pub role_ref: RoleRef,
    pub effect: String,
}

/// `ClusterRoleBinding.spec` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRoleBindingSpec {
    pub entitlement: Entitlement,
    pub role_ref: RoleRef,
    pub effect: String,
}

/// Which of the four CR kinds an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrKind {
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
}

impl CrKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
        }
    }
}

/// A CR object as delivered by the (external) informer cache: metadata plus
/// an untyped spec. The untyped spec is what lets a "wrong-type event" (the
/// cache delivering a mismatched object kind) be detected at handling time
/// rather than assumed away by the type system, matching §4.F's explicit
/// wrong-type-event case.
#[derive(Debug, Clone)]
pub struct RawObject {
    pub meta: ObjectMeta,
    pub spec: serde_json::Value,
}

/// A CR change event (§9: "a sum type `Event = Added(kind,obj) |
/// Updated(kind,oldObj,newObj) | Deleted(kind,obj)`").
#[derive(Debug, Clone)]
pub enum Event {
    Added { kind: CrKind, object: RawObject },
    Updated { kind: CrKind, old: RawObject, new: RawObject },
    Deleted { kind: CrKind, object: RawObject, tombstone: bool },
}

fn role_namespace_token(meta_namespace: Option<&str>, cluster_scoped: bool) -> String {
    if cluster_scoped {
        WILDCARD.to_string()
    } else {
        meta_namespace.filter(|ns| !ns.is_empty()).map_or_else(|| WILDCARD.to_string(), ToString::to_string)
    }
}

fn parse_spec<T: for<'de> Deserialize<'de>>(kind: CrKind, object: &RawObject) -> Result<T, SyncError> {
    serde_json::from_value(object.spec.clone()).map_err(|_| SyncError::WrongType { expected: kind.as_str() })
}

async fn apply_role_actions(store: &PolicyStore, role_name: &str, namespace_token: &str, actions: &[String], add: bool) -> Result<(), StoreError> {
    for action in actions {
        let row = GrantRow::new(role_name, action.clone(), namespace_token);
        if add {
            store.add_grant(&row).await?;
        } else {
            store.remove_grant(&row).await?;
        }
    }
    Ok(())
}

async fn handle_role_added(store: &PolicyStore, kind: CrKind, object: &RawObject, cluster_scoped: bool) -> Result<(), SyncError> {
    let spec: RoleSpec = parse_spec(kind, object)?;
    let namespace = role_namespace_token(object.meta.namespace.as_deref(), cluster_scoped);
    apply_role_actions(store, &object.meta.name, &namespace, &spec.actions, true).await?;
    Ok(())
}

async fn handle_role_deleted(store: &PolicyStore, kind: CrKind, object: &RawObject, cluster_scoped: bool) -> Result<(), SyncError> {
    let spec: RoleSpec = parse_spec(kind, object)?;
    let namespace = role_namespace_token(object.meta.namespace.as_deref(), cluster_scoped);
    apply_role_actions(store, &object.meta.name, &namespace, &spec.actions, false).await?;
    Ok(())
}

async fn handle_role_updated(store: &PolicyStore, kind: CrKind, old: &RawObject, new: &RawObject, cluster_scoped: bool) -> Result<(), SyncError> {
    if old.meta.generation == new.meta.generation {
        return Ok(());
    }
    let old_spec: RoleSpec = parse_spec(kind, old)?;
    let new_spec: RoleSpec = parse_spec(kind, new)?;
    let namespace = role_namespace_token(new.meta.namespace.as_deref(), cluster_scoped);

    let old_set: std::collections::HashSet<&String> = old_spec.actions.iter().collect();
    let new_set: std::collections::HashSet<&String> = new_spec.actions.iter().collect();

    let added: Vec<String> = new_set.difference(&old_set).map(|s| (*s).clone()).collect();
    let removed: Vec<String> = old_set.difference(&new_set).map(|s| (*s).clone()).collect();

    apply_role_actions(store, &new.meta.name, &namespace, &added, true).await?;
    apply_role_actions(store, &new.meta.name, &namespace, &removed, false).await?;
    Ok(())
}

fn binding_tuple(meta: &ObjectMeta, entitlement: &Entitlement, target_path: Option<&TargetPath>, role_ref: &RoleRef, effect: &str, cluster_scoped: bool) -> Result<BindingRow, SyncError> {
    if effect.is_empty() {
        return Err(SyncError::EmptyEffect);
    }

    let subject = format!("{}:{}", entitlement.claim, entitlement.value);

    let resource = if cluster_scoped {
        WILDCARD.to_string()
    } else {
        let target_path = target_path.cloned().unwrap_or_default();
        hierarchy_to_path(&ResourceHierarchy::new(meta.namespace.clone(), target_path.project, target_path.component))
    };

    let role_namespace = if cluster_scoped {
        WILDCARD.to_string()
    } else if role_ref.kind == RoleRefKind::Role {
        role_namespace_token(meta.namespace.as_deref(), false)
    } else {
        WILDCARD.to_string()
    };

    Ok(BindingRow::new(subject, resource, role_ref.name.clone(), role_namespace, effect.to_string(), String::new()))
}

async fn handle_role_binding_added(store: &PolicyStore, kind: CrKind, object: &RawObject, cluster_scoped: bool) -> Result<(), SyncError> {
    let row = if cluster_scoped {
        let spec: ClusterRoleBindingSpec = parse_spec(kind, object)?;
        binding_tuple(&object.meta, &spec.entitlement, None, &spec.role_ref, &spec.effect, true)?
    } else {
        let spec: RoleBindingSpec = parse_spec(kind, object)?;
        binding_tuple(&object.meta, &spec.entitlement, Some(&spec.target_path), &spec.role_ref, &spec.effect, false)?
    };
    store.add_binding(&row).await.map_err(SyncError::Store)?;
    Ok(())
}

async fn handle_role_binding_deleted(store: &PolicyStore, kind: CrKind, object: &RawObject, cluster_scoped: bool) -> Result<(), SyncError> {
    let row = if cluster_scoped {
        let spec: ClusterRoleBindingSpec = parse_spec(kind, object)?;
        binding_tuple(&object.meta, &spec.entitlement, None, &spec.role_ref, &spec.effect, true)?
    } else {
        let spec: RoleBindingSpec = parse_spec(kind, object)?;
        binding_tuple(&object.meta, &spec.entitlement, Some(&spec.target_path), &spec.role_ref, &spec.effect, false)?
    };
    store.remove_binding(&row).await.map_err(SyncError::Store)?;
    Ok(())
}

async fn handle_role_binding_updated(store: &PolicyStore, kind: CrKind, old: &RawObject, new: &RawObject, cluster_scoped: bool) -> Result<(), SyncError> {
    if old.meta.generation == new.meta.generation {
        return Ok(());
    }

    let (old_row, new_row) = if cluster_scoped {
        let old_spec: ClusterRoleBindingSpec = parse_spec(kind, old)?;
        let new_spec: ClusterRoleBindingSpec = parse_spec(kind, new)?;
        (
            binding_tuple(&old.meta, &old_spec.entitlement, None, &old_spec.role_ref, &old_spec.effect, true)?,
            binding_tuple(&new.meta, &new_spec.entitlement, None, &new_spec.role_ref, &new_spec.effect, true)?,
        )
    } else {
        let old_spec: RoleBindingSpec = parse_spec(kind, old)?;
        let new_spec: RoleBindingSpec = parse_spec(kind, new)?;
        (
            binding_tuple(&old.meta, &old_spec.entitlement, Some(&old_spec.target_path), &old_spec.role_ref, &old_spec.effect, false)?,
            binding_tuple(&new.meta, &new_spec.entitlement, Some(&new_spec.target_path), &new_spec.role_ref, &new_spec.effect, false)?,
        )
    };

    let replaced = store.update_binding(&old_row, &new_row).await.map_err(SyncError::Store)?;
    if !replaced {
        tracing::warn!(name = %new.meta.name, "binding did not exist to update");
    }
    Ok(())
}

/// Apply one event to `store`, returning an error on failure instead of
/// logging — used directly by tests that need to assert on the outcome.
/// [`handle_event`] is the production entry point and never propagates
/// this error.
///
/// # Errors
/// Returns [`SyncError`] on a wrong-typed spec, an empty binding effect, or
/// a store failure.
pub async fn try_handle_event(store: &PolicyStore, event: &Event) -> Result<(), SyncError> {
    match event {
        Event::Added { kind: kind @ (CrKind::Role | CrKind::ClusterRole), object } => {
            handle_role_added(store, *kind, object, *kind == CrKind::ClusterRole).await
        }
        Event::Deleted { kind: kind @ (CrKind::Role | CrKind::ClusterRole), object, tombstone } => {
            let object = unwrap_tombstone(object, *tombstone);
            handle_role_deleted(store, *kind, object, *kind == CrKind::ClusterRole).await
        }
        Event::Updated { kind: kind @ (CrKind::Role | CrKind::ClusterRole), old, new } => {
            handle_role_updated(store, *kind, old, new, *kind == CrKind::ClusterRole).await
        }
        Event::Added { kind: kind @ (CrKind::RoleBinding | CrKind::ClusterRoleBinding), object } => {
            handle_role_binding_added(store, *kind, object, *kind == CrKind::ClusterRoleBinding).await
        }
        Event::Deleted { kind: kind @ (CrKind::RoleBinding | CrKind::ClusterRoleBinding), object, tombstone } => {
            let object = unwrap_tombstone(object, *tombstone);
            handle_role_binding_deleted(store, *kind, object, *kind == CrKind::ClusterRoleBinding).await
        }
        Event::Updated { kind: kind @ (CrKind::RoleBinding | CrKind::ClusterRoleBinding), old, new } => {
            handle_role_binding_updated(store, *kind, old, new, *kind == CrKind::ClusterRoleBinding).await
        }
    }
}

/// Tombstones (§4.F: "DELETE may arrive as a 'last-known state unknown'
/// placeholder") wrap the same object shape this implementation always
/// carries; unwrapping is a no-op projection rather than a fallible
/// recovery, since — unlike a fully type-erased cache — the object here is
/// never actually lost.
fn unwrap_tombstone(object: &RawObject, tombstone: bool) -> &RawObject {
    if tombstone {
        tracing::debug!("unwrapping tombstoned delete event");
    }
    object
}

/// Handle one event against `store`, logging and swallowing any failure
/// (§4.F/§7: handler failures are never propagated, never panic).
pub async fn handle_event(store: &PolicyStore, event: Event) {
    if let Err(err) = try_handle_event(store, &event).await {
        tracing::warn!(error = %err, "policy synchronizer event failed");
    }
}
