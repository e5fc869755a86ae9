//! Action Catalog (§4.A).
//!
//! A compile-time constant list plus whatever is seeded into the store from
//! an external file at startup. The catalog itself never mutates at
//! runtime — adding or removing an action is a code/config change.

/// A single registered action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub is_internal: bool,
}

impl Action {
    #[must_use]
    pub fn new(name: impl Into<String>, is_internal: bool) -> Self {
        Self {
            name: name.into(),
            is_internal,
        }
    }
}

/// The built-in default actions, seeded at process start (§4.D item 1).
///
/// Marked internal per §3.2 ("seeded actions ... are tagged `is_internal =
/// true`"); public listing only ever sees [`PublicActions`] /
/// [`ConcretePublicActions`] derived from whatever the store actually holds.
#[must_use]
pub fn default_actions() -> Vec<Action> {
    [
        "namespace:view",
        "namespace:create",
        "namespace:update",
        "namespace:delete",
        "project:view",
        "project:create",
        "project:update",
        "project:delete",
        "component:view",
        "component:create",
        "component:update",
        "component:delete",
        "component:deploy",
    ]
    .into_iter()
    .map(|name| Action::new(name, true))
    .collect()
}

/// `AllActions` — every action known to the catalog, in the order given.
#[must_use]
pub fn all_actions(actions: &[Action]) -> Vec<Action> {
    actions.to_vec()
}

/// `PublicActions` — non-internal actions, sorted lexicographically by name.
#[must_use]
pub fn public_actions(actions: &[Action]) -> Vec<Action> {
    let mut public: Vec<Action> = actions.iter().filter(|a| !a.is_internal).cloned().collect();
    public.sort_by(|a, b| a.name.cmp(&b.name));
    public
}

/// `ConcretePublicActions` — public actions that don't contain a wildcard.
#[must_use]
pub fn concrete_public_actions(actions: &[Action]) -> Vec<Action> {
    public_actions(actions).into_iter().filter(|a| !a.name.contains('*')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_actions_excludes_internal_and_sorts() {
        let actions = vec![
            Action::new("b:view", false),
            Action::new("a:view", false),
            Action::new("c:view", true),
        ];
        let public = public_actions(&actions);
        assert_eq!(public.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["a:view", "b:view"]);
    }

    #[test]
    fn concrete_public_actions_excludes_wildcards() {
        let actions = vec![Action::new("a:view", false), Action::new("a:*", false)];
        let concrete = concrete_public_actions(&actions);
        assert_eq!(concrete.len(), 1);
        assert_eq!(concrete[0].name, "a:view");
    }
}
