//! PAP (§4.H): a thin CRUD surface over the four CR kinds, validating
//! writes before they reach the (external) CR client. The Synchronizer
//! observes the CR client's effects and propagates them into the Policy
//! Store asynchronously — this module never touches the store directly.

use crate::catalog::{public_actions, Action};
use crate::error::PapError;
use crate::sync::{ClusterRoleBindingSpec, Entitlement, RoleBindingSpec, RoleRef, RoleRefKind, RoleSpec, TargetPath};

/// Validate a `Role`/`ClusterRole` create request (§4.H: "a role has ≥ 1
/// action").
///
/// # Errors
/// Returns [`PapError::InvalidRequest`] if `spec.actions` is empty.
pub fn validate_role_create(spec: &RoleSpec) -> Result<(), PapError> {
    if spec.actions.is_empty() {
        return Err(PapError::InvalidRequest("role must have at least one action".to_string()));
    }
    Ok(())
}

fn validate_entitlement(entitlement: &Entitlement) -> Result<(), PapError> {
    if entitlement.claim.is_empty() || entitlement.value.is_empty() {
        return Err(PapError::InvalidRequest("entitlement claim and value must be non-empty".to_string()));
    }
    Ok(())
}

fn validate_role_ref(role_ref: &RoleRef) -> Result<(), PapError> {
    if role_ref.name.is_empty() {
        return Err(PapError::InvalidRequest("role_ref.name must be non-empty".to_string()));
    }
    Ok(())
}

/// Validate a `RoleBinding` create request (§4.H): `role_ref.name`
/// non-empty; entitlement non-empty; and — "a mapping's `role_ref.namespace`,
/// if non-empty, equals `hierarchy.namespace`" — namespace-scoped roles may
/// only be bound within their own namespace. The CR schema (§6) carries no
/// explicit `role_ref.namespace` field (a `RoleBinding`'s `Role` reference
/// is always implicitly scoped to the binding's own namespace), so
/// `role_ref_namespace` is `None` for every CR-surface call; it exists so
/// the legacy flat [`RoleEntitlementMapping`], which does carry an explicit
/// role namespace, can reuse this same check.
///
/// # Errors
/// Returns [`PapError::InvalidRequest`] on the first violated rule.
pub fn validate_role_binding_create(hierarchy_namespace: &str, role_ref_namespace: Option<&str>, spec: &RoleBindingSpec) -> Result<(), PapError> {
    validate_role_ref(&spec.role_ref)?;
    validate_entitlement(&spec.entitlement)?;
    if let Some(namespace) = role_ref_namespace.filter(|ns| !ns.is_empty()) {
        if namespace != hierarchy_namespace {
            return Err(PapError::InvalidRequest("namespace-scoped role may only be bound within its own namespace".to_string()));
        }
    }
    Ok(())
}

/// Validate a `ClusterRoleBinding` create request (§4.H).
///
/// # Errors
/// Returns [`PapError::InvalidRequest`] on the first violated rule.
pub fn validate_cluster_role_binding_create(spec: &ClusterRoleBindingSpec) -> Result<(), PapError> {
    validate_role_ref(&spec.role_ref)?;
    validate_entitlement(&spec.entitlement)
}

/// `ListActions` (§6): `ConcretePublicActions` joined with any wildcard
/// public actions — i.e. exactly `PublicActions`.
#[must_use]
pub fn list_actions(actions: &[Action]) -> Vec<String> {
    public_actions(actions).into_iter().map(|a| a.name).collect()
}

/// A flat, pre-four-kind-surface binding shape (§4.H: "legacy flat
/// `RoleEntitlementMapping`-based entry points remain for backward
/// compatibility"). Every public function on this type is deprecated and
/// forwards to the equivalent `RoleBinding`/`ClusterRoleBinding` spec.
#[derive(Debug, Clone)]
pub struct RoleEntitlementMapping {
    pub claim: String,
    pub value: String,
    pub namespace: Option<String>,
    pub project: Option<String>,
    pub component: Option<String>,
    pub role_name: String,
    pub role_kind: RoleRefKind,
    pub role_namespace: Option<String>,
    pub effect: String,
}

impl RoleEntitlementMapping {
    /// Build the `RoleBinding`/`ClusterRoleBinding` spec this mapping
    /// describes, along with the namespace to create it in (`None` for a
    /// `ClusterRoleBinding`).
    #[deprecated(note = "use the four-kind RoleBinding/ClusterRoleBinding surface directly")]
    #[must_use]
    pub fn into_binding_spec(self) -> RoleEntitlementBindingSpec {
        let entitlement = Entitlement { claim: self.claim, value: self.value };
        let role_ref = RoleRef { kind: self.role_kind, name: self.role_name };

        match self.namespace {
            Some(namespace) if !namespace.is_empty() => RoleEntitlementBindingSpec::Namespaced {
                namespace,
                spec: RoleBindingSpec {
                    entitlement,
                    target_path: TargetPath { project: self.project, component: self.component },
                    role_ref,
                    effect: self.effect,
                },
            },
            _ => RoleEntitlementBindingSpec::Cluster(ClusterRoleBindingSpec { entitlement, role_ref, effect: self.effect }),
        }
    }
}

/// The result of translating a flat [`RoleEntitlementMapping`] into the
/// four-kind surface's spec shapes.
#[derive(Debug, Clone)]
pub enum RoleEntitlementBindingSpec {
    Namespaced { namespace: String, spec: RoleBindingSpec },
    Cluster(ClusterRoleBindingSpec),
}

/// Validate a legacy flat mapping the same way its four-kind equivalent
/// would be validated.
///
/// # Errors
/// Returns [`PapError::InvalidRequest`] on the first violated rule.
#[deprecated(note = "use validate_role_binding_create/validate_cluster_role_binding_create directly")]
#[allow(deprecated)]
pub fn validate_legacy_mapping(mapping: RoleEntitlementMapping) -> Result<(), PapError> {
    let role_namespace = mapping.role_namespace.clone();
    match mapping.into_binding_spec() {
        RoleEntitlementBindingSpec::Namespaced { namespace, spec } => validate_role_binding_create(&namespace, role_namespace.as_deref(), &spec),
        RoleEntitlementBindingSpec::Cluster(spec) => validate_cluster_role_binding_create(&spec),
    }
}
