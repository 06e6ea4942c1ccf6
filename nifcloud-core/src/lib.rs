//! NIFCLOUD Core
//!
//! Resource model shared by the NIFCLOUD provider: attribute values, schemas,
//! the provider trait, status waiters and child-list reconciliation.

pub mod provider;
pub mod reconcile;
pub mod resource;
pub mod schema;
pub mod waiter;
