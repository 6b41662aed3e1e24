//! Item repository over one provisioned collection.
//!
//! # Responsibility
//! - Resolve and cache the database/collection identities once.
//! - Provide find/get/add/update over the cached collection.
//!
//! # Invariants
//! - Identities are cached only after both database and collection resolve.
//! - Every operation before a successful `initialize()` fails with
//!   `RepoError::NotInitialized`.
//! - Service failures are returned unchanged inside `RepoError::Client`.

use crate::client::{ClientError, DocumentClient, QuerySpec, ResourceDescriptor, Scope};
use crate::config::AppConfig;
use crate::model::item::Item;
use crate::model::resource::{is_valid_resource_id, CollectionRef, DatabaseRef};
use crate::repo::provisioner::{get_or_create_collection, get_or_create_database};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for item persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// `initialize()` has not completed successfully yet.
    NotInitialized,
    Client(ClientError),
    /// Update target does not exist.
    NotFound(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "item repository is not initialized"),
            Self::Client(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid stored item: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Client(err) => Some(err),
            Self::NotInitialized | Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ClientError> for RepoError {
    fn from(value: ClientError) -> Self {
        Self::Client(value)
    }
}

#[derive(Debug, Clone)]
struct Resolved {
    database: DatabaseRef,
    collection: CollectionRef,
}

/// Generic item CRUD over one named collection.
pub struct ItemRepository<C: DocumentClient> {
    client: C,
    database_id: String,
    collection_id: String,
    resolved: Option<Resolved>,
}

impl<C: DocumentClient> ItemRepository<C> {
    /// Creates an uninitialized repository. No service call is made.
    pub fn new(
        client: C,
        database_id: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            database_id: database_id.into(),
            collection_id: collection_id.into(),
            resolved: None,
        }
    }

    /// Creates an uninitialized repository for the configured names.
    pub fn from_config(client: C, config: &AppConfig) -> Self {
        Self::new(client, config.database_id.clone(), config.collection_id.clone())
    }

    /// Resolves (creating when absent) the database, then the collection.
    ///
    /// Calling again after success is a no-op.
    ///
    /// # Errors
    /// - Returns the first service failure unchanged; cached identities stay unset.
    pub fn initialize(&mut self) -> RepoResult<()> {
        if self.resolved.is_some() {
            return Ok(());
        }

        let started_at = Instant::now();
        let resolved = get_or_create_database(&self.client, &self.database_id).and_then(
            |database| {
                get_or_create_collection(&self.client, &database, &self.collection_id)
                    .map(|collection| Resolved {
                        database,
                        collection,
                    })
            },
        );

        match resolved {
            Ok(resolved) => {
                info!(
                    "event=repo_init module=repo status=ok database={} collection={} duration_ms={}",
                    self.database_id,
                    self.collection_id,
                    started_at.elapsed().as_millis()
                );
                self.resolved = Some(resolved);
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=repo_init module=repo status=error database={} collection={} duration_ms={} error={}",
                    self.database_id,
                    self.collection_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.resolved.is_some()
    }

    /// Resolved database identity, once initialized.
    pub fn database(&self) -> Option<&DatabaseRef> {
        self.resolved.as_ref().map(|resolved| &resolved.database)
    }

    /// Resolved collection identity, once initialized.
    pub fn collection(&self) -> Option<&CollectionRef> {
        self.resolved.as_ref().map(|resolved| &resolved.collection)
    }

    /// Runs `query` against the collection. No match yields an empty vec.
    pub fn find(&self, query: &QuerySpec) -> RepoResult<Vec<Item>> {
        let scope = Scope::Collection(self.require_collection()?.self_link.clone());
        self.client
            .query_resources(&scope, query)?
            .into_iter()
            .map(parse_item)
            .collect()
    }

    /// Reads one item by id. `Ok(None)` when it does not exist.
    ///
    /// An id that can never be stored (blank, or holding a link separator)
    /// is also `Ok(None)`.
    pub fn get_item(&self, item_id: &str) -> RepoResult<Option<Item>> {
        let collection = self.require_collection()?;
        if !is_valid_resource_id(item_id) {
            return Ok(None);
        }
        let link = collection.self_link.document(item_id);
        self.client
            .read_resource(&link)?
            .map(parse_item)
            .transpose()
    }

    /// Inserts a new item and returns its stored representation.
    ///
    /// # Errors
    /// - `RepoError::Client(ClientError::Conflict)` when the id is taken.
    pub fn add_item(&self, item: &Item) -> RepoResult<Item> {
        let scope = Scope::Collection(self.require_collection()?.self_link.clone());
        let created = self.client.create_resource(&scope, &item.to_body())?;
        parse_item(created)
    }

    /// Replaces the stored content of `item_id` with `item`.
    ///
    /// The stored id is always `item_id`, whatever `item.id` holds.
    ///
    /// # Errors
    /// - `RepoError::NotFound` when no item has that id, or the id can never
    ///   be stored.
    pub fn update_item(&self, item_id: &str, item: &Item) -> RepoResult<Item> {
        let collection = self.require_collection()?;
        if !is_valid_resource_id(item_id) {
            return Err(RepoError::NotFound(item_id.to_string()));
        }
        let link = collection.self_link.document(item_id);
        let mut body = item.to_body();
        body.insert("id".to_string(), item_id.into());

        match self.client.replace_resource(&link, &body) {
            Ok(replaced) => parse_item(replaced),
            Err(ClientError::NotFound(_)) => Err(RepoError::NotFound(item_id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    fn require_collection(&self) -> RepoResult<&CollectionRef> {
        self.collection().ok_or(RepoError::NotInitialized)
    }
}

fn parse_item(descriptor: ResourceDescriptor) -> RepoResult<Item> {
    Item::from_body(descriptor.to_body()).map_err(RepoError::InvalidData)
}
