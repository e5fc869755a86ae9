//! End-to-end scenarios and quantified invariants, run against a
//! [`MemoryBackend`] so no I/O is required.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use authz_core::config::CacheConfig;
use authz_core::matcher::{action_match, expand_action_wildcard, hierarchy_to_path, resource_match, resource_path_to_hierarchy, ActionIndex, ResourceHierarchy};
use authz_core::pdp::{batch_evaluate, evaluate, subject_profile, CancellationToken, EvaluateRequest, ProfileRequest, ResourceRef};
use authz_core::seeder::seed_defaults;
use authz_core::subject::SubjectContext;
use authz_core::sync::{try_handle_event, CrKind, Event, ObjectMeta, RawObject};
use authz_core::PolicyStore;
use authz_store::{GrantRow, MemoryBackend, PolicyBackend};
use serde_json::json;

fn store() -> PolicyStore {
    let backend: Arc<dyn PolicyBackend> = Arc::new(MemoryBackend::new());
    PolicyStore::new(backend, CacheConfig::default())
}

fn subject(claim: &str, values: Vec<&str>) -> SubjectContext {
    SubjectContext { subject_type: "user".to_string(), claim: claim.to_string(), values: values.into_iter().map(ToString::to_string).collect() }
}

fn meta(name: &str, namespace: Option<&str>, generation: i64) -> ObjectMeta {
    ObjectMeta { name: name.to_string(), namespace: namespace.map(ToString::to_string), uid: "uid".to_string(), generation }
}

#[tokio::test]
async fn s1_seed_and_detect_super_admin() {
    let store = store();
    seed_defaults(&store).await.unwrap();

    let request = EvaluateRequest {
        subject_context: subject("groups", vec!["admin"]),
        resource: ResourceRef { resource_type: "Namespace".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
        action: "component:view".to_string(),
        context: String::new(),
    };
    let decision = evaluate(&store, &request).await.unwrap();
    assert!(decision.allowed);
}

#[tokio::test]
async fn s2_cluster_role_and_binding_via_synchronizer() {
    let store = store();

    let role = RawObject { meta: meta("global-viewer", None, 1), spec: json!({"actions": ["namespace:view"]}) };
    try_handle_event(&store, &Event::Added { kind: CrKind::ClusterRole, object: role }).await.unwrap();

    let binding = RawObject {
        meta: meta("viewers-binding", None, 1),
        spec: json!({
            "entitlement": {"claim": "groups", "value": "viewers"},
            "role_ref": {"kind": "ClusterRole", "name": "global-viewer"},
            "effect": "allow",
        }),
    };
    try_handle_event(&store, &Event::Added { kind: CrKind::ClusterRoleBinding, object: binding }).await.unwrap();

    let allow_request = EvaluateRequest {
        subject_context: subject("groups", vec!["viewers"]),
        resource: ResourceRef { resource_type: "Project".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
        action: "namespace:view".to_string(),
        context: String::new(),
    };
    assert!(evaluate(&store, &allow_request).await.unwrap().allowed);

    let deny_request = EvaluateRequest { action: "project:create".to_string(), ..allow_request };
    let decision = evaluate(&store, &deny_request).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, "no matching policy");
}

#[tokio::test]
async fn s3_narrower_deny_binding_overrides_broader_allow() {
    let store = store();

    let editor_role = RawObject { meta: meta("editor", Some("acme"), 1), spec: json!({"actions": ["component:*"]}) };
    try_handle_event(&store, &Event::Added { kind: CrKind::Role, object: editor_role }).await.unwrap();

    let allow_binding = RawObject {
        meta: meta("devs-allow", Some("acme"), 1),
        spec: json!({
            "entitlement": {"claim": "groups", "value": "devs"},
            "target_path": {},
            "role_ref": {"kind": "Role", "name": "editor"},
            "effect": "allow",
        }),
    };
    try_handle_event(&store, &Event::Added { kind: CrKind::RoleBinding, object: allow_binding }).await.unwrap();

    let deny_binding = RawObject {
        meta: meta("devs-deny-secret", Some("acme"), 1),
        spec: json!({
            "entitlement": {"claim": "groups", "value": "devs"},
            "target_path": {"project": "secret"},
            "role_ref": {"kind": "Role", "name": "editor"},
            "effect": "deny",
        }),
    };
    try_handle_event(&store, &Event::Added { kind: CrKind::RoleBinding, object: deny_binding }).await.unwrap();

    let request = EvaluateRequest {
        subject_context: subject("groups", vec!["devs"]),
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
async fn s4_update_role_generation_gated() {
    let store = store();

    let v1 = RawObject { meta: meta("editor", Some("acme"), 1), spec: json!({"actions": ["component:view", "component:create"]}) };
    try_handle_event(&store, &Event::Added { kind: CrKind::Role, object: v1.clone() }).await.unwrap();

    let same_generation = RawObject { meta: meta("editor", Some("acme"), 1), spec: json!({"actions": ["component:view"]}) };
    try_handle_event(&store, &Event::Updated { kind: CrKind::Role, old: v1.clone(), new: same_generation }).await.unwrap();
    assert!(store.has_grant(&GrantRow::new("editor", "component:create", "acme")).await.unwrap());

    let v2 = RawObject { meta: meta("editor", Some("acme"), 2), spec: json!({"actions": ["component:view", "component:update"]}) };
    try_handle_event(&store, &Event::Updated { kind: CrKind::Role, old: v1, new: v2 }).await.unwrap();

    assert!(!store.has_grant(&GrantRow::new("editor", "component:create", "acme")).await.unwrap());
    assert!(store.has_grant(&GrantRow::new("editor", "component:update", "acme")).await.unwrap());
}

#[tokio::test]
async fn s5_subject_profile_reports_only_within_scope_actions() {
    let store = store();
    store.backend().seed_actions(&[authz_store::ActionRow::new("namespace:view", false)]).await.unwrap();

    let role = RawObject { meta: meta("global-viewer", None, 1), spec: json!({"actions": ["namespace:view"]}) };
    try_handle_event(&store, &Event::Added { kind: CrKind::ClusterRole, object: role }).await.unwrap();
    let binding = RawObject {
        meta: meta("viewers-binding", None, 1),
        spec: json!({
            "entitlement": {"claim": "groups", "value": "viewers"},
            "role_ref": {"kind": "ClusterRole", "name": "global-viewer"},
            "effect": "allow",
        }),
    };
    try_handle_event(&store, &Event::Added { kind: CrKind::ClusterRoleBinding, object: binding }).await.unwrap();

    let cancelled = AtomicBool::new(false);
    let request = ProfileRequest { subject_context: subject("groups", vec!["viewers"]), scope: ResourceHierarchy::new(Some("acme".into()), None, None) };
    let profile = subject_profile(&store, &request, CancellationToken::new(&cancelled)).await.unwrap();

    let namespace_view = profile.capabilities.get("namespace:view").expect("namespace:view capability present");
    assert_eq!(namespace_view.allowed.len(), 1);
    assert_eq!(namespace_view.allowed[0].path, "*");
    assert!(profile.capabilities.len() == 1, "only namespace:view should appear");
}

#[tokio::test]
async fn s6_deleting_cluster_role_binding_reverts_to_deny() {
    let store = store();

    let role = RawObject { meta: meta("global-viewer", None, 1), spec: json!({"actions": ["namespace:view"]}) };
    try_handle_event(&store, &Event::Added { kind: CrKind::ClusterRole, object: role }).await.unwrap();
    let binding = RawObject {
        meta: meta("viewers-binding", None, 1),
        spec: json!({
            "entitlement": {"claim": "groups", "value": "viewers"},
            "role_ref": {"kind": "ClusterRole", "name": "global-viewer"},
            "effect": "allow",
        }),
    };
    try_handle_event(&store, &Event::Added { kind: CrKind::ClusterRoleBinding, object: binding.clone() }).await.unwrap();

    let request = EvaluateRequest {
        subject_context: subject("groups", vec!["viewers"]),
        resource: ResourceRef { resource_type: "Project".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
        action: "namespace:view".to_string(),
        context: String::new(),
    };
    assert!(evaluate(&store, &request).await.unwrap().allowed);

    try_handle_event(&store, &Event::Deleted { kind: CrKind::ClusterRoleBinding, object: binding, tombstone: false }).await.unwrap();
    let decision = evaluate(&store, &request).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, "no matching policy");
}

#[test]
fn invariant_2_action_match_prefix_semantics() {
    assert!(action_match("component:view", "component:*"));
    assert!(action_match("component:deploy", "component:*"));
    assert!(!action_match("componentx:view", "component:*"));
    assert!(!action_match("component", "component:*"));
}

#[test]
fn invariant_3_resource_match_semantics() {
    assert!(resource_match("ns/acme", "*"));
    assert!(resource_match("ns/acme", "ns/acme"));
    assert!(resource_match("ns/acme/project/p", "ns/acme"));
    assert!(!resource_match("ns/acme-other", "ns/acme"));
}

#[test]
fn invariant_4_hierarchy_path_round_trips() {
    let hierarchies = vec![
        ResourceHierarchy::default(),
        ResourceHierarchy::new(Some("acme".into()), None, None),
        ResourceHierarchy::new(Some("acme".into()), Some("p".into()), Some("c".into())),
    ];
    for hierarchy in hierarchies {
        let path = hierarchy_to_path(&hierarchy);
        assert_eq!(resource_path_to_hierarchy(&path), hierarchy);
    }
}

#[tokio::test]
async fn invariant_5_seeder_is_idempotent() {
    let store = store();
    let first = seed_defaults(&store).await.unwrap();
    let second = seed_defaults(&store).await.unwrap();
    assert!(first.actions_inserted > 0);
    assert_eq!(second.actions_inserted, 0);
    assert_eq!(second.grants_inserted, 0);
    assert_eq!(second.bindings_inserted, 0);
}

#[tokio::test]
async fn invariant_6_deny_overrides_many_allows() {
    let store = store();
    store.add_grant(&GrantRow::new("editor", "component:view", "acme")).await.unwrap();
    for i in 0..5 {
        store
            .add_binding(&authz_store::BindingRow::new(format!("groups:devs-{i}"), "ns/acme", "editor", "acme", "allow", ""))
            .await
            .unwrap();
    }
    store.add_binding(&authz_store::BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "deny", "")).await.unwrap();
    store.add_binding(&authz_store::BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();

    let request = EvaluateRequest {
        subject_context: subject("groups", vec!["devs"]),
        resource: ResourceRef { resource_type: "Component".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
        action: "component:view".to_string(),
        context: String::new(),
    };
    assert!(!evaluate(&store, &request).await.unwrap().allowed);
}

#[test]
fn invariant_7_wildcard_expansion() {
    let idx = ActionIndex::build(&["component:view".into(), "component:create".into(), "namespace:view".into()]);
    assert_eq!(expand_action_wildcard("*", &idx).len(), idx.all_actions.len());
    assert!(expand_action_wildcard("component:*", &idx).iter().all(|a| a.starts_with("component:")));
}

#[tokio::test]
async fn batch_evaluate_is_independent_per_subrequest() {
    let store = store();
    store.add_grant(&GrantRow::new("editor", "component:view", "acme")).await.unwrap();
    store.add_binding(&authz_store::BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();

    let allowed = EvaluateRequest {
        subject_context: subject("groups", vec!["devs"]),
        resource: ResourceRef { resource_type: "Component".to_string(), id: None, hierarchy: ResourceHierarchy::new(Some("acme".into()), None, None) },
        action: "component:view".to_string(),
        context: String::new(),
    };
    let invalid = EvaluateRequest {
        subject_context: SubjectContext { subject_type: "user".to_string(), claim: String::new(), values: vec![] },
        ..allowed.clone()
    };

    let cancelled = AtomicBool::new(false);
    let results = batch_evaluate(&store, &[allowed, invalid], CancellationToken::new(&cancelled)).await.unwrap();
    assert!(results[0].as_ref().unwrap().allowed);
    assert!(results[1].is_err());
}

#[tokio::test]
async fn role_binding_with_empty_effect_is_rejected() {
    let store = store();
    let object = RawObject {
        meta: meta("bad-binding", Some("acme"), 1),
        spec: json!({
            "entitlement": {"claim": "groups", "value": "devs"},
            "target_path": {},
            "role_ref": {"kind": "Role", "name": "editor"},
            "effect": "",
        }),
    };
    let result = try_handle_event(&store, &Event::Added { kind: CrKind::RoleBinding, object }).await;
    assert!(result.is_err());
}
