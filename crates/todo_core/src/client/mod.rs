//! Document service boundary.
//!
//! # Responsibility
//! - Define the `DocumentClient` capability the provisioner and repository call.
//! - Define the service error taxonomy and opaque query specification.
//! - Host the SQLite-backed local service implementation.
//!
//! # Invariants
//! - Every client call is one request/response exchange; no retries.
//! - "No matching resource" on read is `Ok(None)`, never an error.

use crate::db::DbError;
use crate::model::item::SYSTEM_FIELDS;
use crate::model::resource::{CollectionRef, DatabaseRef, ResourceLink};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod query;
pub mod sqlite_client;

pub use sqlite_client::SqliteDocumentClient;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures reported by the document service.
#[derive(Debug)]
pub enum ClientError {
    /// Underlying storage/transport failed.
    Store(DbError),
    Unauthorized(String),
    /// Malformed query, resource spec or link.
    BadRequest(String),
    /// A resource with the same id already exists in the target scope.
    Conflict(String),
    /// The scope a query or create addressed does not exist.
    ScopeNotFound(ResourceLink),
    /// The resource a replace addressed does not exist.
    NotFound(ResourceLink),
    InvalidData(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "document store error: {err}"),
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::BadRequest(message) => write!(f, "bad request: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::ScopeNotFound(link) => write!(f, "scope not found: {link}"),
            Self::NotFound(link) => write!(f, "resource not found: {link}"),
            Self::InvalidData(message) => write!(f, "invalid stored resource: {message}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ClientError {
    fn from(value: DbError) -> Self {
        Self::Store(value)
    }
}

impl From<rusqlite::Error> for ClientError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(DbError::Sqlite(value))
    }
}

/// Where a query or create is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Databases of the account.
    Account,
    /// Collections of one database.
    Database(ResourceLink),
    /// Documents of one collection.
    Collection(ResourceLink),
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account => f.write_str("account"),
            Self::Database(link) | Self::Collection(link) => write!(f, "{link}"),
        }
    }
}

/// Named value bound into a query (`@name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

/// Service-defined filter expression.
///
/// Callers outside `client` treat this as opaque and pass it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Binds `@name` (the leading `@` is optional).
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = if name.starts_with('@') {
            name.to_string()
        } else {
            format!("@{name}")
        };
        self.parameters.push(QueryParameter {
            name,
            value: value.into(),
        });
        self
    }

    /// Exact-name match, as used for existence checks.
    pub fn by_id(id: &str) -> Self {
        Self::new("SELECT * FROM root r WHERE r.id = @id").bind("@id", id)
    }
}

/// One resource as returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub id: String,
    pub rid: String,
    pub self_link: ResourceLink,
    pub etag: String,
    /// Last write, unix epoch seconds.
    pub ts: i64,
    /// User content, without `id` and system fields. Empty for databases/collections.
    pub content: Map<String, Value>,
}

impl ResourceDescriptor {
    /// Full JSON view: content plus `id` and system fields.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.content.clone();
        body.insert("id".to_string(), Value::String(self.id.clone()));
        body.insert("_rid".to_string(), Value::String(self.rid.clone()));
        body.insert(
            "_self".to_string(),
            Value::String(self.self_link.to_string()),
        );
        body.insert("_etag".to_string(), Value::String(self.etag.clone()));
        body.insert("_ts".to_string(), Value::from(self.ts));
        body
    }

    pub fn to_database_ref(&self) -> DatabaseRef {
        DatabaseRef {
            id: self.id.clone(),
            rid: self.rid.clone(),
            self_link: self.self_link.clone(),
        }
    }

    pub fn to_collection_ref(&self) -> CollectionRef {
        CollectionRef {
            id: self.id.clone(),
            rid: self.rid.clone(),
            self_link: self.self_link.clone(),
        }
    }
}

/// Strips `id` and system fields from a caller-supplied spec.
pub(crate) fn user_content(spec: &Map<String, Value>) -> Map<String, Value> {
    spec.iter()
        .filter(|(key, _)| key.as_str() != "id" && !SYSTEM_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Capability exposed by a document database service.
pub trait DocumentClient {
    /// Runs `query` against every resource directly under `scope`.
    fn query_resources(
        &self,
        scope: &Scope,
        query: &QuerySpec,
    ) -> ClientResult<Vec<ResourceDescriptor>>;

    /// Creates a resource under `scope` from `spec` (must carry `id`).
    fn create_resource(
        &self,
        scope: &Scope,
        spec: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor>;

    /// Reads one resource; `Ok(None)` when it does not exist.
    fn read_resource(&self, link: &ResourceLink) -> ClientResult<Option<ResourceDescriptor>>;

    /// Replaces the content of an existing resource.
    fn replace_resource(
        &self,
        link: &ResourceLink,
        content: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor>;
}

impl<C: DocumentClient + ?Sized> DocumentClient for &C {
    fn query_resources(
        &self,
        scope: &Scope,
        query: &QuerySpec,
    ) -> ClientResult<Vec<ResourceDescriptor>> {
        (**self).query_resources(scope, query)
    }

    fn create_resource(
        &self,
        scope: &Scope,
        spec: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor> {
        (**self).create_resource(scope, spec)
    }

    fn read_resource(&self, link: &ResourceLink) -> ClientResult<Option<ResourceDescriptor>> {
        (**self).read_resource(link)
    }

    fn replace_resource(
        &self,
        link: &ResourceLink,
        content: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor> {
        (**self).replace_resource(link, content)
    }
}
