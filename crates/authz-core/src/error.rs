//! Per-component error taxonomy.
//!
//! Each domain component owns a narrow error enum; callers that need a
//! single error type (the server crate, mainly) fold these into one
//! aggregate. Synchronizer errors are the one exception — per §4.F/§7 they
//! never leave [`crate::sync`]; they are logged and dropped there.

use authz_store::StorageError;

/// Errors from the [`crate::catalog`] action catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("action seed source is malformed: {0}")]
    MalformedSeed(String),
}

/// Errors from the [`crate::store`] policy store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("policy store backend failure: {0}")]
    Backend(#[from] StorageError),
}

/// Errors from the [`crate::seeder`] bootstrap seeder.
#[derive(Debug, thiserror::Error)]
pub enum SeederError {
    #[error("seed transaction failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the [`crate::subject`] subject detector.
#[derive(Debug, thiserror::Error)]
pub enum SubjectError {
    #[error("subject detector config is invalid: {0}")]
    InvalidConfig(String),

    #[error("bearer token is malformed: {0}")]
    MalformedToken(String),

    #[error("no valid user type detected")]
    NoMatch,
}

/// Errors from the [`crate::sync`] policy synchronizer.
///
/// Never surfaced to PDP/PAP callers; handlers log these at `warn!` and
/// leave the store untouched (§4.F, §7).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("event carried a wrong-typed object for {expected}")]
    WrongType { expected: &'static str },

    #[error("binding event has empty effect")]
    EmptyEffect,

    #[error("store mutation failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the [`crate::pdp`] policy decision point.
#[derive(Debug, thiserror::Error)]
pub enum PdpError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("policy store failure: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the [`crate::pap`] policy administration surface.
#[derive(Debug, thiserror::Error)]
pub enum PapError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("role not found: {0}")]
    RoleNotFound(String),

    #[error("role already exists: {0}")]
    RoleAlreadyExists(String),

    #[error("mapping not found: {0}")]
    MappingNotFound(String),

    #[error("mapping already exists: {0}")]
    MappingAlreadyExists(String),

    #[error("seeded mapping is immutable: {0}")]
    SystemMappingImmutable(String),

    #[error("authorization subsystem is disabled")]
    AuthzDisabled,

    #[error("internal failure: {0}")]
    Internal(String),

    #[error("policy store failure: {0}")]
    Store(#[from] StoreError),
}
