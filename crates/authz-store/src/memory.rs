//! In-memory policy-tuple backend.
//!
//! Two indexed sets standing in for the `g` and `p` relations, per the
//! design notes' explicitly-permitted alternative to the SQLite mirror.
//! Used as the default backend in tests and by any caller willing to accept
//! warm-restart cost (no cross-process durability).

use std::collections::HashSet;

use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::{ActionRow, BindingField, BindingRow, GrantField, GrantRow, PolicyBackend};

/// An in-memory [`PolicyBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    grants: RwLock<HashSet<GrantRow>>,
    bindings: RwLock<HashSet<BindingRow>>,
    actions: RwLock<HashSet<ActionRow>>,
}

impl MemoryBackend {
    /// Create a new, empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

fn grant_field(row: &GrantRow, field: GrantField) -> &str {
    match field {
        GrantField::Role => &row.role,
        GrantField::Action => &row.action,
        GrantField::Namespace => &row.namespace,
    }
}

fn binding_field(row: &BindingRow, field: BindingField) -> &str {
    match field {
        BindingField::Subject => &row.subject,
        BindingField::Resource => &row.resource,
        BindingField::Role => &row.role,
        BindingField::Namespace => &row.namespace,
        BindingField::Effect => &row.effect,
    }
}

#[async_trait::async_trait]
impl PolicyBackend for MemoryBackend {
    async fn add_grant(&self, row: &GrantRow) -> Result<bool, StorageError> {
        Ok(self.grants.write().await.insert(row.clone()))
    }

    async fn remove_grant(&self, row: &GrantRow) -> Result<bool, StorageError> {
        Ok(self.grants.write().await.remove(row))
    }

    async fn has_grant(&self, row: &GrantRow) -> Result<bool, StorageError> {
        Ok(self.grants.read().await.contains(row))
    }

    async fn filtered_grants(&self, field: GrantField, value: &str) -> Result<Vec<GrantRow>, StorageError> {
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .filter(|row| grant_field(row, field) == value)
            .cloned()
            .collect())
    }

    async fn all_grants(&self) -> Result<Vec<GrantRow>, StorageError> {
        Ok(self.grants.read().await.iter().cloned().collect())
    }

    async fn add_binding(&self, row: &BindingRow) -> Result<bool, StorageError> {
        Ok(self.bindings.write().await.insert(row.clone()))
    }

    async fn remove_binding(&self, row: &BindingRow) -> Result<bool, StorageError> {
        Ok(self.bindings.write().await.remove(row))
    }

    async fn has_binding(&self, row: &BindingRow) -> Result<bool, StorageError> {
        Ok(self.bindings.read().await.contains(row))
    }

    async fn update_binding(&self, old: &BindingRow, new: &BindingRow) -> Result<bool, StorageError> {
        let mut bindings = self.bindings.write().await;
        if !bindings.remove(old) {
            return Ok(false);
        }
        bindings.insert(new.clone());
        Ok(true)
    }

    async fn filtered_bindings(&self, field: BindingField, value: &str) -> Result<Vec<BindingRow>, StorageError> {
        Ok(self
            .bindings
            .read()
            .await
            .iter()
            .filter(|row| binding_field(row, field) == value)
            .cloned()
            .collect())
    }

    async fn all_bindings(&self) -> Result<Vec<BindingRow>, StorageError> {
        Ok(self.bindings.read().await.iter().cloned().collect())
    }

    async fn seed_actions(&self, rows: &[ActionRow]) -> Result<u64, StorageError> {
        let mut actions = self.actions.write().await;
        let mut inserted = 0u64;
        for row in rows {
            if actions.insert(row.clone()) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn seed_grants(&self, rows: &[GrantRow]) -> Result<u64, StorageError> {
        let mut grants = self.grants.write().await;
        let mut inserted = 0u64;
        for row in rows {
            if grants.insert(row.clone()) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn seed_bindings(&self, rows: &[BindingRow]) -> Result<u64, StorageError> {
        let mut bindings = self.bindings.write().await;
        let mut inserted = 0u64;
        for row in rows {
            if bindings.insert(row.clone()) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_actions(&self) -> Result<Vec<ActionRow>, StorageError> {
        Ok(self.actions.read().await.iter().cloned().collect())
    }
}
