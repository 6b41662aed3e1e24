//! Domain records and resource identities.
//!
//! # Responsibility
//! - Define the resource addressing shared by client, provisioner and repository.
//! - Define the generic `Item` record and its to-do `Task` projection.
//!
//! # Invariants
//! - Items are identified by a caller-visible string `id`.
//! - Database and collection identities are resolved once, never fabricated.

pub mod item;
pub mod resource;
pub mod task;
