//! PDP (§4.G): `Evaluate`, `BatchEvaluate`, `SubjectProfile`.

use std::collections::HashMap;

use authz_store::BindingField;

use crate::error::PdpError;
use crate::matcher::{expand_action_wildcard, hierarchy_to_path, is_within_scope, ActionIndex, ResourceHierarchy};
use crate::store::PolicyStore;
use crate::subject::SubjectContext;

/// A cancellation context, checked at every iteration boundary in batch and
/// profile operations (§5: "Cancellation surfaces as an error — never a
/// partial result").
#[derive(Debug, Clone, Copy)]
pub struct CancellationToken<'a> {
    cancelled: &'a std::sync::atomic::AtomicBool,
}

impl<'a> CancellationToken<'a> {
    #[must_use]
    pub fn new(cancelled: &'a std::sync::atomic::AtomicBool) -> Self {
        Self { cancelled }
    }

    fn check(self) -> Result<(), PdpError> {
        if self.cancelled.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(PdpError::Cancelled);
        }
        Ok(())
    }
}

/// A resource reference: type name, optional concrete id, and the
/// hierarchy used for path rendering (§4.G).
#[derive(Debug, Clone)]
pub struct ResourceRef {
    pub resource_type: String,
    pub id: Option<String>,
    pub hierarchy: ResourceHierarchy,
}

/// Input to `Evaluate` (§4.G).
#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub subject_context: SubjectContext,
    pub resource: ResourceRef,
    pub action: String,
    pub context: String,
}

/// `Decision` (§4.G step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

fn validate_subject(subject_context: &SubjectContext) -> Result<(), PdpError> {
    if !subject_context.is_valid() {
        return Err(PdpError::InvalidRequest("subject context must have a non-empty claim and at least one value".to_string()));
    }
    Ok(())
}

/// `Evaluate` (§4.G). Deny-overrides is strict across every subject value.
///
/// # Errors
/// Returns [`PdpError::InvalidRequest`] if the subject context is invalid,
/// or [`PdpError::Store`] on a backend failure.
pub async fn evaluate(store: &PolicyStore, request: &EvaluateRequest) -> Result<Decision, PdpError> {
    validate_subject(&request.subject_context)?;

    let resource_path = hierarchy_to_path(&request.resource.hierarchy);

    let mut any_deny = false;
    let mut any_allow = false;

    for subject_value in &request.subject_context.values {
        let subject = format!("{}:{}", request.subject_context.claim, subject_value);
        let outcome = store.enforce(&subject, &resource_path, &request.action, &request.context).await?;
        any_deny |= outcome.matched_deny;
        any_allow |= outcome.matched_allow;
    }

    if any_deny {
        Ok(Decision { allowed: false, reason: "denied by matching policy".to_string() })
    } else if any_allow {
        Ok(Decision { allowed: true, reason: "allowed by matching policy".to_string() })
    } else {
        Ok(Decision { allowed: false, reason: "no matching policy".to_string() })
    }
}

/// `BatchEvaluate` (§4.G): evaluates each sub-request independently, in
/// input order, with no early exit. Checks cancellation before each
/// sub-request.
///
/// # Errors
/// Returns [`PdpError::Cancelled`] if `cancellation` fires before a
/// sub-request starts. Individual sub-request failures are captured in the
/// returned `Vec`'s corresponding slot, not propagated — "one's failure
/// does not affect another" (§4.G).
pub async fn batch_evaluate(
    store: &PolicyStore,
    requests: &[EvaluateRequest],
    cancellation: CancellationToken<'_>,
) -> Result<Vec<Result<Decision, PdpError>>, PdpError> {
    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        cancellation.check()?;
        results.push(evaluate(store, request).await);
    }
    Ok(results)
}

/// Input to `SubjectProfile` (§4.G).
#[derive(Debug, Clone)]
pub struct ProfileRequest {
    pub subject_context: SubjectContext,
    pub scope: ResourceHierarchy,
}

/// A deduplicated-by-path resource reference inside a capability list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityResource {
    pub path: String,
}

/// Per-action allow/deny resource lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCapability {
    pub allowed: Vec<CapabilityResource>,
    pub denied: Vec<CapabilityResource>,
}

/// `UserCapabilitiesResponse` (§4.G).
#[derive(Debug, Clone)]
pub struct UserCapabilitiesResponse {
    pub user: String,
    pub capabilities: HashMap<String, ActionCapability>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

fn push_dedup(list: &mut Vec<CapabilityResource>, path: String) {
    if !list.iter().any(|r| r.path == path) {
        list.push(CapabilityResource { path });
    }
}

/// `SubjectProfile` (§4.G).
///
/// # Errors
/// Returns [`PdpError::InvalidRequest`] if the subject context is invalid,
/// [`PdpError::Cancelled`] if cancellation fires mid-scan, or
/// [`PdpError::Store`] on a backend failure.
pub async fn subject_profile(
    store: &PolicyStore,
    request: &ProfileRequest,
    cancellation: CancellationToken<'_>,
) -> Result<UserCapabilitiesResponse, PdpError> {
    validate_subject(&request.subject_context)?;

    let all_actions = store.backend().list_actions().await.map_err(crate::error::StoreError::from)?;
    let action_names: Vec<String> = all_actions.into_iter().filter(|a| !a.internal && !a.name.contains('*')).map(|a| a.name).collect();
    let action_index = ActionIndex::build(&action_names);

    let scope_path = hierarchy_to_path(&request.scope);
    let mut capabilities: HashMap<String, ActionCapability> = HashMap::new();

    for subject_value in &request.subject_context.values {
        let subject = format!("{}:{}", request.subject_context.claim, subject_value);
        let bindings = store.bindings_for_subject(&subject).await.map_err(PdpError::from)?;

        for binding in bindings {
            cancellation.check()?;
            if !is_within_scope(&binding.resource, &scope_path) {
                continue;
            }

            let grants = store.filtered_grants(authz_store::GrantField::Role, &binding.role).await.map_err(PdpError::from)?;
            for grant in grants.into_iter().filter(|g| g.namespace == binding.namespace) {
                for action in expand_action_wildcard(&grant.action, &action_index) {
                    let entry = capabilities.entry(action).or_default();
                    if binding.effect == "allow" {
                        push_dedup(&mut entry.allowed, binding.resource.clone());
                    } else {
                        push_dedup(&mut entry.denied, binding.resource.clone());
                    }
                }
            }
        }
    }

    Ok(UserCapabilitiesResponse {
        user: format!("{}:{}", request.subject_context.claim, request.subject_context.values.join(",")),
        capabilities,
        generated_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{atomic::AtomicBool, Arc};

    use authz_store::{GrantRow, MemoryBackend, PolicyBackend};

    use super::*;
    use crate::config::CacheConfig;

    fn store() -> PolicyStore {
        let backend: Arc<dyn PolicyBackend> = Arc::new(MemoryBackend::new());
        PolicyStore::new(backend, CacheConfig::default())
    }

    fn subject_ctx(values: Vec<&str>) -> SubjectContext {
        SubjectContext { subject_type: "user".to_string(), claim: "groups".to_string(), values: values.into_iter().map(ToString::to_string).collect() }
    }

    #[tokio::test]
    async fn s1_seeded_super_admin_allows() {
        let store = store();
        crate::seeder::seed_defaults(&store).await.unwrap();

        let request = EvaluateRequest {
            subject_context: subject_ctx(vec!["admin"]),
            resource: ResourceRef { resource_type: "Namespace".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
            action: "component:view".to_string(),
            context: String::new(),
        };
        let decision = evaluate(&store, &request).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn s2_cluster_role_binding_allows_and_denies_by_action() {
        let store = store();
        store.add_grant(&GrantRow::new("global-viewer", "namespace:view", "*")).await.unwrap();
        store.add_binding(&authz_store::BindingRow::new("groups:viewers", "*", "global-viewer", "*", "allow", "")).await.unwrap();

        let base = EvaluateRequest {
            subject_context: subject_ctx(vec!["viewers"]),
            resource: ResourceRef { resource_type: "Project".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
            action: "namespace:view".to_string(),
            context: String::new(),
        };
        assert!(evaluate(&store, &base).await.unwrap().allowed);

        let denied = EvaluateRequest { action: "project:create".to_string(), ..base };
        assert!(!evaluate(&store, &denied).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn s3_narrower_deny_overrides_broader_allow() {
        let store = store();
        store.add_grant(&GrantRow::new("editor", "component:*", "acme")).await.unwrap();
        store.add_binding(&authz_store::BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();
        store.add_binding(&authz_store::BindingRow::new("groups:devs", "ns/acme/project/secret", "editor", "acme", "deny", "")).await.unwrap();

        let request = EvaluateRequest {
            subject_context: subject_ctx(vec!["devs"]),
            resource: ResourceRef {
                resource_type: "Component".to_string(),
                id: None,
                hierarchy: ResourceHierarchy::new(Some("acme".into()), Some("secret".into()), Some("c1".into())),
            },
            action: "component:deploy".to_string(),
            context: String::new(),
        };
        assert!(!evaluate(&store, &request).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn batch_evaluate_preserves_order_with_no_early_exit() {
        let store = store();
        store.add_grant(&GrantRow::new("editor", "component:view", "acme")).await.unwrap();
        store.add_binding(&authz_store::BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();

        let allow_req = EvaluateRequest {
            subject_context: subject_ctx(vec!["devs"]),
            resource: ResourceRef { resource_type: "Component".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
            action: "component:view".to_string(),
            context: String::new(),
        };
        let deny_req = EvaluateRequest { action: "component:delete".to_string(), ..allow_req.clone() };

        let cancelled = AtomicBool::new(false);
        let results = batch_evaluate(&store, &[allow_req, deny_req], CancellationToken::new(&cancelled)).await.unwrap();
        assert!(results[0].as_ref().unwrap().allowed);
        assert!(!results[1].as_ref().unwrap().allowed);
    }

    #[tokio::test]
    async fn batch_evaluate_respects_cancellation() {
        let store = store();
        let cancelled = AtomicBool::new(true);
        let request = EvaluateRequest {
            subject_context: subject_ctx(vec!["devs"]),
            resource: ResourceRef { resource_type: "Component".to_string(), id: None, hierarchy: ResourceHierarchy::default() },
            action: "component:view".to_string(),
            context: String::new(),
        };
        let result = batch_evaluate(&store, &[request], CancellationToken::new(&cancelled)).await;
        assert!(matches!(result, Err(PdpError::Cancelled)));
    }

    #[tokio::test]
    async fn s5_subject_profile_scopes_by_ancestor_or_descendant() {
        let store = store();
        store.backend().seed_actions(&[authz_store::ActionRow::new("namespace:view", false)]).await.unwrap();
        store.add_grant(&GrantRow::new("global-viewer", "namespace:view", "*")).await.unwrap();
        store.add_binding(&authz_store::BindingRow::new("groups:viewers", "*", "global-viewer", "*", "allow", "")).await.unwrap();

        let cancelled = AtomicBool::new(false);
        let request = ProfileRequest { subject_context: subject_ctx(vec!["viewers"]), scope: ResourceHierarchy::new(Some("acme".into()), None, None) };
        let profile = subject_profile(&store, &request, CancellationToken::new(&cancelled)).await.unwrap();

        let namespace_view = profile.capabilities.get("namespace:view").unwrap();
        assert_eq!(namespace_view.allowed, vec![CapabilityResource { path: "*".to_string() }]);
        assert!(profile.capabilities.get("component:view").is_none());
    }
}
