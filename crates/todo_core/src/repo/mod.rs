//! Provisioning and item persistence over a `DocumentClient`.
//!
//! # Responsibility
//! - Resolve databases/collections by name with get-or-create semantics.
//! - Expose generic item CRUD over one resolved collection.
//!
//! # Invariants
//! - Repository APIs distinguish "not found" (`Ok(None)` / `NotFound`) from
//!   service failures (`RepoError::Client`).

pub mod item_repo;
pub mod provisioner;
