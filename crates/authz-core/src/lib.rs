//! Domain logic for the OpenChoreo authorization engine.
//!
//! This crate owns everything that isn't persistence ([`authz_store`]) or
//! network transport (the server crate): the action catalog, the policy
//! store's matching algorithm, the bootstrap seeder, the bearer-token
//! subject detector, the CR synchronizer, and the PDP/PAP surfaces that sit
//! on top of all of it.
//!
//! Module layering mirrors the component table: lower modules (`catalog`,
//! `matcher`) have no dependency on higher ones (`pdp`, `pap`); `store`
//! wraps `authz_store::PolicyBackend` and is the one piece of shared
//! mutable state every other module reads or writes through.

pub mod catalog;
pub mod config;
pub mod error;
pub mod matcher;
pub mod pap;
pub mod pdp;
pub mod seeder;
pub mod store;
pub mod subject;
pub mod sync;

pub use store::PolicyStore;
