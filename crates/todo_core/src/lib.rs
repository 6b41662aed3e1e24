//! Core of the to-do list application.
//! Owns the get-or-create provisioning and item repository invariants.

pub mod client;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use client::{
    ClientError, ClientResult, DocumentClient, QueryParameter, QuerySpec, ResourceDescriptor,
    Scope, SqliteDocumentClient,
};
pub use config::AppConfig;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError, LoggingOptions};
pub use model::item::Item;
pub use model::resource::{CollectionRef, DatabaseRef, ResourceLink};
pub use model::task::Task;
pub use repo::item_repo::{ItemRepository, RepoError, RepoResult};
pub use repo::provisioner::{get_or_create_collection, get_or_create_database};
pub use service::task_service::{TaskResult, TaskService, TaskServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
