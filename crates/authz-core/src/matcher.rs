//! Matcher Functions (§4.C) plus the hierarchy-path helpers they and the
//! PDP share (§3.1, §4.G).

use std::collections::HashMap;

/// The reserved wildcard token meaning "all" wherever it appears as a
/// `role_namespace`, `resource_path`, or `grant.action` (§6).
pub const WILDCARD: &str = "*";

/// An ordered `(namespace, project, component)` triple (§3.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceHierarchy {
    pub namespace: Option<String>,
    pub project: Option<String>,
    pub component: Option<String>,
}

impl ResourceHierarchy {
    #[must_use]
    pub fn new(namespace: Option<String>, project: Option<String>, component: Option<String>) -> Self {
        Self { namespace, project, component }
    }
}

/// Render a [`ResourceHierarchy`] to its path form:
/// `ns/<n>/project/<p>/component/<c>`, with an empty tuple rendered as `*`.
#[must_use]
pub fn hierarchy_to_path(hierarchy: &ResourceHierarchy) -> String {
    let mut segments = Vec::new();
    if let Some(ns) = hierarchy.namespace.as_deref().filter(|s| !s.is_empty()) {
        segments.push("ns".to_string());
        segments.push(ns.to_string());
        if let Some(project) = hierarchy.project.as_deref().filter(|s| !s.is_empty()) {
            segments.push("project".to_string());
            segments.push(project.to_string());
            if let Some(component) = hierarchy.component.as_deref().filter(|s| !s.is_empty()) {
                segments.push("component".to_string());
                segments.push(component.to_string());
            }
        }
    }
    if segments.is_empty() {
        WILDCARD.to_string()
    } else {
        segments.join("/")
    }
}

/// The inverse of [`hierarchy_to_path`]; invariant 4 in §8 requires this to
/// round-trip for every well-formed hierarchy.
#[must_use]
pub fn resource_path_to_hierarchy(path: &str) -> ResourceHierarchy {
    if path == WILDCARD || path.is_empty() {
        return ResourceHierarchy::default();
    }
    let parts: Vec<&str> = path.split('/').collect();
    let mut hierarchy = ResourceHierarchy::default();
    let mut iter = parts.chunks(2);
    while let Some(chunk) = iter.next() {
        match chunk {
            ["ns", value] => hierarchy.namespace = Some((*value).to_string()),
            ["project", value] => hierarchy.project = Some((*value).to_string()),
            ["component", value] => hierarchy.component = Some((*value).to_string()),
            _ => {}
        }
    }
    hierarchy
}

/// `resourceMatch(req_res, policy_res)` (§4.C).
#[must_use]
pub fn resource_match(req_res: &str, policy_res: &str) -> bool {
    policy_res == WILDCARD
        || req_res == policy_res
        || req_res.starts_with(&format!("{policy_res}/"))
}

/// `actionMatch(req_action, role_action)` (§4.C).
#[must_use]
pub fn action_match(req_action: &str, role_action: &str) -> bool {
    if role_action == WILDCARD || role_action == req_action {
        return true;
    }
    if let Some(prefix) = role_action.strip_suffix(":*") {
        let prefix_with_colon = format!("{prefix}:");
        return req_action.starts_with(&prefix_with_colon) && req_action.len() > prefix_with_colon.len();
    }
    false
}

/// `ctxMatch(req_ctx, policy_ctx)` (§4.C) — the union-of-both-empty
/// resolution adopted from the two divergent source revisions (§9).
#[must_use]
pub fn ctx_match(req_ctx: &str, policy_ctx: &str) -> bool {
    policy_ctx.is_empty() || req_ctx == policy_ctx || req_ctx.is_empty()
}

/// Dispatches between [`action_match`] and plain equality based on whether
/// `value` looks like an action pattern (contains `:` or is `*`), per
/// §4.C's "store's role-matcher function" rule. Used for matching role
/// names and namespaces, which never carry colons.
#[must_use]
pub fn role_field_match(request_value: &str, stored_value: &str) -> bool {
    if stored_value == WILDCARD || stored_value.contains(':') {
        action_match(request_value, stored_value)
    } else {
        request_value == stored_value
    }
}

/// `isWithinScope(policy, scope)` (§4.G).
#[must_use]
pub fn is_within_scope(policy: &str, scope: &str) -> bool {
    policy == WILDCARD
        || scope == WILDCARD
        || policy == scope
        || policy.starts_with(&format!("{scope}/"))
        || scope.starts_with(&format!("{policy}/"))
}

/// An index of concrete action names, grouped by resource-type prefix, used
/// by [`expand_action_wildcard`].
#[derive(Debug, Default, Clone)]
pub struct ActionIndex {
    pub all_actions: Vec<String>,
    pub by_resource_type: HashMap<String, Vec<String>>,
}

impl ActionIndex {
    /// Build an index from a flat list of concrete action names
    /// (`<resourceType>:<verb>`).
    #[must_use]
    pub fn build(actions: &[String]) -> Self {
        let mut by_resource_type: HashMap<String, Vec<String>> = HashMap::new();
        for action in actions {
            if let Some((prefix, _verb)) = action.split_once(':') {
                by_resource_type.entry(prefix.to_string()).or_default().push(action.clone());
            }
        }
        Self {
            all_actions: actions.to_vec(),
            by_resource_type,
        }
    }
}

/// `expandActionWildcard(pattern, idx)` (§4.G).
#[must_use]
pub fn expand_action_wildcard(pattern: &str, index: &ActionIndex) -> Vec<String> {
    if pattern == WILDCARD {
        return index.all_actions.clone();
    }
    if let Some(prefix) = pattern.strip_suffix(":*") {
        return index.by_resource_type.get(prefix).cloned().unwrap_or_default();
    }
    vec![pattern.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_round_trips() {
        let cases = vec![
            ResourceHierarchy::default(),
            ResourceHierarchy::new(Some("acme".into()), None, None),
            ResourceHierarchy::new(Some("acme".into()), Some("secret".into()), None),
            ResourceHierarchy::new(Some("acme".into()), Some("secret".into()), Some("c1".into())),
        ];
        for hierarchy in cases {
            let path = hierarchy_to_path(&hierarchy);
            assert_eq!(resource_path_to_hierarchy(&path), hierarchy);
        }
    }

    #[test]
    fn empty_hierarchy_renders_wildcard() {
        assert_eq!(hierarchy_to_path(&ResourceHierarchy::default()), "*");
    }

    #[test]
    fn resource_match_exact_wildcard_and_ancestor() {
        assert!(resource_match("ns/acme", "*"));
        assert!(resource_match("ns/acme", "ns/acme"));
        assert!(resource_match("ns/acme/project/p", "ns/acme"));
        assert!(!resource_match("ns/acme2", "ns/acme"));
        assert!(!resource_match("ns/acmefoo", "ns/acme"));
    }

    #[test]
    fn action_match_prefix_wildcard() {
        assert!(action_match("component:view", "*"));
        assert!(action_match("component:view", "component:view"));
        assert!(action_match("component:view", "component:*"));
        assert!(!action_match("component", "component:*"));
        assert!(!action_match("componentx:view", "component:*"));
    }

    #[test]
    fn ctx_match_union_of_empty() {
        assert!(ctx_match("", ""));
        assert!(ctx_match("anything", ""));
        assert!(ctx_match("", "anything"));
        assert!(ctx_match("same", "same"));
        assert!(!ctx_match("a", "b"));
    }

    #[test]
    fn expand_wildcard_variants() {
        let idx = ActionIndex::build(&["component:view".into(), "component:create".into(), "namespace:view".into()]);
        assert_eq!(expand_action_wildcard("*", &idx).len(), idx.all_actions.len());
        let component_actions = expand_action_wildcard("component:*", &idx);
        assert!(component_actions.iter().all(|a| a.starts_with("component:")));
        assert_eq!(expand_action_wildcard("namespace:view", &idx), vec!["namespace:view".to_string()]);
    }

    #[test]
    fn within_scope_both_directions() {
        assert!(is_within_scope("ns/acme", "ns/acme/project/p"));
        assert!(is_within_scope("ns/acme/project/p", "ns/acme"));
        assert!(!is_within_scope("ns/acme", "ns/other"));
    }
}
