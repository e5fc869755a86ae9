//! Runs the same assertions against every [`PolicyBackend`] implementation
//! through a trait object, so `MemoryBackend` and `SqliteBackend` are held
//! to one contract instead of two independently-drifting test suites.

use std::sync::Arc;

use authz_store::{ActionRow, BindingRow, GrantRow, MemoryBackend, PolicyBackend};

#[cfg(feature = "sqlite-backend")]
use authz_store::SqliteBackend;

async fn backends() -> Vec<(&'static str, Arc<dyn PolicyBackend>)> {
    let mut backends: Vec<(&'static str, Arc<dyn PolicyBackend>)> = vec![("memory", Arc::new(MemoryBackend::new()))];

    #[cfg(feature = "sqlite-backend")]
    {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.into_path().join("policy.db");
        let sqlite = SqliteBackend::connect(path.to_str().expect("utf8 path")).await.expect("open sqlite backend");
        backends.push(("sqlite", Arc::new(sqlite)));
    }

    backends
}

#[tokio::test]
async fn add_grant_is_idempotent_on_every_backend() {
    for (name, backend) in backends().await {
        let row = GrantRow::new("editor", "component:view", "acme");
        assert!(backend.add_grant(&row).await.unwrap(), "{name}: first insert should add");
        assert!(!backend.add_grant(&row).await.unwrap(), "{name}: second insert should be a no-op");
        assert!(backend.has_grant(&row).await.unwrap(), "{name}: grant should be present");
    }
}

#[tokio::test]
async fn remove_grant_is_idempotent_on_every_backend() {
    for (name, backend) in backends().await {
        let row = GrantRow::new("editor", "component:view", "acme");
        backend.add_grant(&row).await.unwrap();
        assert!(backend.remove_grant(&row).await.unwrap(), "{name}: first remove should delete");
        assert!(!backend.remove_grant(&row).await.unwrap(), "{name}: second remove should be a no-op");
        assert!(!backend.has_grant(&row).await.unwrap(), "{name}: grant should be gone");
    }
}

#[tokio::test]
async fn update_binding_replaces_atomically_on_every_backend() {
    for (name, backend) in backends().await {
        let old = BindingRow::new("groups:devs", "*", "editor", "acme", "allow", "");
        let new = BindingRow::new("groups:devs", "*", "editor", "acme", "deny", "");

        assert!(!backend.update_binding(&old, &new).await.unwrap(), "{name}: replace of an absent tuple should fail");
        assert!(!backend.has_binding(&new).await.unwrap(), "{name}: failed replace must leave no trace");

        backend.add_binding(&old).await.unwrap();
        assert!(backend.update_binding(&old, &new).await.unwrap(), "{name}: replace of a present tuple should succeed");
        assert!(!backend.has_binding(&old).await.unwrap(), "{name}: old tuple should be gone");
        assert!(backend.has_binding(&new).await.unwrap(), "{name}: new tuple should be present");
    }
}

#[tokio::test]
async fn filtered_bindings_matches_single_column_on_every_backend() {
    for (name, backend) in backends().await {
        backend.add_binding(&BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", "")).await.unwrap();
        backend.add_binding(&BindingRow::new("groups:ops", "ns/acme", "viewer", "acme", "allow", "")).await.unwrap();

        let by_subject = backend.filtered_bindings(authz_store::BindingField::Subject, "groups:devs").await.unwrap();
        assert_eq!(by_subject.len(), 1, "{name}: exactly one binding for groups:devs");
        assert_eq!(by_subject[0].role, "editor", "{name}: matched binding should reference editor");
    }
}

#[tokio::test]
async fn seeding_actions_twice_is_idempotent_on_every_backend() {
    for (name, backend) in backends().await {
        let rows = vec![ActionRow::new("component:view", true), ActionRow::new("component:create", true)];
        assert_eq!(backend.seed_actions(&rows).await.unwrap(), 2, "{name}: first seed inserts both rows");
        assert_eq!(backend.seed_actions(&rows).await.unwrap(), 0, "{name}: second seed inserts nothing");
        assert_eq!(backend.list_actions().await.unwrap().len(), 2, "{name}: exactly two actions registered");
    }
}
