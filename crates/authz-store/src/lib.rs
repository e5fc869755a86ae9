//! Persistence abstraction for the OpenChoreo authorization engine.
//!
//! This crate defines [`PolicyBackend`] — a pure tuple-storage interface
//! modeled on the `casbin_rules(ptype, v0..v5, internal)` schema from the
//! authorization engine's policy model. It knows nothing about roles,
//! subjects, hierarchical resource paths, or matching — that domain logic
//! lives in `authz-core`, which wraps a backend the same way the rest of
//! this workspace wraps its storage trait with a domain-aware layer.
//!
//! Two implementations are provided:
//!
//! - [`MemoryBackend`] — an in-memory two-map structure, the alternative the
//!   authorization engine's design notes explicitly permit for callers who
//!   accept warm-restart cost. Used by default in tests.
//! - [`SqliteBackend`] — the embedded relational mirror: a single SQLite
//!   file with a unique index on `(ptype, v0..v5)`, giving O(log N) exact
//!   lookup and crash-free in-process durability (feature `sqlite-backend`,
//!   enabled by default).

mod error;
mod memory;
#[cfg(feature = "sqlite-backend")]
mod sqlite_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "sqlite-backend")]
pub use sqlite_backend::SqliteBackend;

/// A single row of the `g` (grant) relation: `(role_name, action_pattern, role_namespace)`.
///
/// Cluster roles are stored with `namespace == "*"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantRow {
    pub role: String,
    pub action: String,
    pub namespace: String,
    pub internal: bool,
}

impl GrantRow {
    #[must_use]
    pub fn new(role: impl Into<String>, action: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            action: action.into(),
            namespace: namespace.into(),
            internal: false,
        }
    }

    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// A single row of the `p` (binding) relation:
/// `(subject, resource_path, role_name, role_namespace, effect, context)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingRow {
    pub subject: String,
    pub resource: String,
    pub role: String,
    pub namespace: String,
    pub effect: String,
    pub context: String,
    pub internal: bool,
}

impl BindingRow {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        role: impl Into<String>,
        namespace: impl Into<String>,
        effect: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            role: role.into(),
            namespace: namespace.into(),
            effect: effect.into(),
            context: context.into(),
            internal: false,
        }
    }

    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// A row of the `actions` relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionRow {
    pub name: String,
    pub internal: bool,
}

impl ActionRow {
    #[must_use]
    pub fn new(name: impl Into<String>, internal: bool) -> Self {
        Self {
            name: name.into(),
            internal,
        }
    }
}

/// Which column of the `g` relation to range-query in [`PolicyBackend::filtered_grants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantField {
    Role,
    Action,
    Namespace,
}

/// Which column of the `p` relation to range-query in [`PolicyBackend::filtered_bindings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingField {
    Subject,
    Resource,
    Role,
    Namespace,
    Effect,
}

/// A pluggable policy-tuple storage backend.
///
/// All mutating operations use insert-on-conflict-do-nothing / delete-if-present
/// semantics so that add/remove are idempotent under concurrent reconcile events
/// (§4.B, §5). Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait PolicyBackend: Send + Sync + 'static {
    /// Insert a grant if it does not already exist. Returns whether a row was added.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn add_grant(&self, row: &GrantRow) -> Result<bool, StorageError>;

    /// Remove a grant if it exists. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn remove_grant(&self, row: &GrantRow) -> Result<bool, StorageError>;

    /// Exact-tuple existence check.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn has_grant(&self, row: &GrantRow) -> Result<bool, StorageError>;

    /// Range query on a single column of the `g` relation.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn filtered_grants(&self, field: GrantField, value: &str) -> Result<Vec<GrantRow>, StorageError>;

    /// All grant rows. Used by the PDP's action-index builder and by tests.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn all_grants(&self) -> Result<Vec<GrantRow>, StorageError>;

    /// Insert a binding if it does not already exist. Returns whether a row was added.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn add_binding(&self, row: &BindingRow) -> Result<bool, StorageError>;

    /// Remove a binding if it exists. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn remove_binding(&self, row: &BindingRow) -> Result<bool, StorageError>;

    /// Exact-tuple existence check.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn has_binding(&self, row: &BindingRow) -> Result<bool, StorageError>;

    /// Atomically replace `old` with `new`. Returns whether `old` was present
    /// and the replacement happened. A failed replace leaves the store
    /// exactly as it was.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn update_binding(&self, old: &BindingRow, new: &BindingRow) -> Result<bool, StorageError>;

    /// Range query on a single column of the `p` relation.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn filtered_bindings(&self, field: BindingField, value: &str) -> Result<Vec<BindingRow>, StorageError>;

    /// All binding rows.
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn all_bindings(&self) -> Result<Vec<BindingRow>, StorageError>;

    /// Insert-on-conflict-do-nothing batch insert of actions. Returns the
    /// number of rows actually inserted (idempotence: re-running returns 0).
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn seed_actions(&self, actions: &[ActionRow]) -> Result<u64, StorageError>;

    /// Insert-on-conflict-do-nothing batch insert of grants.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn seed_grants(&self, grants: &[GrantRow]) -> Result<u64, StorageError>;

    /// Insert-on-conflict-do-nothing batch insert of bindings.
    ///
    /// # Errors
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn seed_bindings(&self, bindings: &[BindingRow]) -> Result<u64, StorageError>;

    /// All registered actions (seeded and application-added).
    ///
    /// # Errors
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn list_actions(&self) -> Result<Vec<ActionRow>, StorageError>;
}
