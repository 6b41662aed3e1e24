//! SQLite-backed local document service.
//!
//! # Responsibility
//! - Implement `DocumentClient` over the migrated document store schema.
//! - Enforce per-scope id uniqueness and report duplicates as `Conflict`.
//! - Bind a store to the first master key that opens it.
//!
//! # Invariants
//! - Every write assigns a fresh `_etag` and `_ts`.
//! - `_rid` is assigned once at create and never changes.
//! - System fields supplied by callers are ignored on write.

use crate::client::query::compile;
use crate::client::{
    user_content, ClientError, ClientResult, DocumentClient, QuerySpec, ResourceDescriptor, Scope,
};
use crate::db::DbError;
use crate::model::resource::{is_valid_resource_id, LinkPath, ResourceLink};
use log::{debug, info, warn};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const DATABASE_COLUMNS: &str = "d.id, d.rid, d.etag, d.ts, NULL AS body";
const COLLECTION_COLUMNS: &str = "c.id, c.rid, c.etag, c.ts, NULL AS body";
const DOCUMENT_COLUMNS: &str = "doc.id, doc.rid, doc.etag, doc.ts, doc.body";

/// Local document service over one SQLite connection.
pub struct SqliteDocumentClient<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentClient<'conn> {
    /// Wraps an already-authorized connection from `open_db*`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Authorizes `master_key` against the store, then wraps the connection.
    ///
    /// # Errors
    /// - `ClientError::Unauthorized` when the key is blank or differs from the
    ///   key the store was first opened with.
    pub fn connect(
        conn: &'conn Connection,
        endpoint: &str,
        master_key: &str,
    ) -> ClientResult<Self> {
        authorize(conn, endpoint, master_key)?;
        Ok(Self::new(conn))
    }

    fn resolve_scope(&self, scope: &Scope) -> ClientResult<ResolvedScope> {
        match scope {
            Scope::Account => Ok(ResolvedScope::Account),
            Scope::Database(link) => match link.parse() {
                Some(LinkPath::Database { database }) => self
                    .database_rid(database)?
                    .map(|rid| ResolvedScope::Database {
                        link: link.clone(),
                        rid,
                    })
                    .ok_or_else(|| ClientError::ScopeNotFound(link.clone())),
                _ => Err(malformed_link(link, "database")),
            },
            Scope::Collection(link) => match link.parse() {
                Some(LinkPath::Collection {
                    database,
                    collection,
                }) => self
                    .collection_rid(database, collection)?
                    .map(|rid| ResolvedScope::Collection {
                        link: link.clone(),
                        rid,
                    })
                    .ok_or_else(|| ClientError::ScopeNotFound(link.clone())),
                _ => Err(malformed_link(link, "collection")),
            },
        }
    }

    fn database_rid(&self, database: &str) -> ClientResult<Option<String>> {
        let rid = self
            .conn
            .query_row(
                "SELECT rid FROM databases WHERE id = ?1;",
                [database],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rid)
    }

    fn collection_rid(&self, database: &str, collection: &str) -> ClientResult<Option<String>> {
        let rid = self
            .conn
            .query_row(
                "SELECT c.rid
                 FROM collections c
                 JOIN databases d ON d.rid = c.database_rid
                 WHERE d.id = ?1 AND c.id = ?2;",
                [database, collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rid)
    }

    fn list_under(&self, scope: &ResolvedScope) -> ClientResult<Vec<ResourceDescriptor>> {
        let (sql, parent_rid) = match scope {
            ResolvedScope::Account => (
                format!("SELECT {DATABASE_COLUMNS} FROM databases d ORDER BY d.seq;"),
                None,
            ),
            ResolvedScope::Database { rid, .. } => (
                format!(
                    "SELECT {COLLECTION_COLUMNS} FROM collections c
                     WHERE c.database_rid = ?1 ORDER BY c.seq;"
                ),
                Some(rid.as_str()),
            ),
            ResolvedScope::Collection { rid, .. } => (
                format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents doc
                     WHERE doc.collection_rid = ?1 ORDER BY doc.seq;"
                ),
                Some(rid.as_str()),
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match parent_rid {
            Some(rid) => stmt.query([rid])?,
            None => stmt.query([])?,
        };

        let mut descriptors = Vec::new();
        while let Some(row) = rows.next()? {
            let stored = StoredRow::from_row(row)?;
            let self_link = scope.child_link(&stored.id);
            descriptors.push(stored.into_descriptor(self_link)?);
        }
        Ok(descriptors)
    }

    fn read_one(
        &self,
        sql: &str,
        keys: &[&str],
        link: &ResourceLink,
    ) -> ClientResult<Option<ResourceDescriptor>> {
        let stored = self
            .conn
            .query_row(sql, params_from_iter(keys), StoredRow::from_row)
            .optional()?;
        stored
            .map(|stored| stored.into_descriptor(link.clone()))
            .transpose()
    }
}

impl DocumentClient for SqliteDocumentClient<'_> {
    fn query_resources(
        &self,
        scope: &Scope,
        query: &QuerySpec,
    ) -> ClientResult<Vec<ResourceDescriptor>> {
        let compiled = compile(query)?;
        let resolved = self.resolve_scope(scope)?;

        let listed = self.list_under(&resolved)?;
        let matched = if compiled.is_unfiltered() {
            listed
        } else {
            listed
                .into_iter()
                .filter(|descriptor| compiled.matches(&descriptor.to_body()))
                .collect::<Vec<_>>()
        };

        debug!(
            "event=resource_query module=client status=ok scope={} matched={}",
            scope,
            matched.len()
        );
        Ok(matched)
    }

    fn create_resource(
        &self,
        scope: &Scope,
        spec: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor> {
        let id = spec_id(spec)?;
        let resolved = self.resolve_scope(scope)?;
        let rid = Uuid::new_v4().simple().to_string();
        let etag = new_etag();
        let ts = now_epoch_secs();
        let content = match resolved {
            ResolvedScope::Collection { .. } => user_content(spec),
            _ => Map::new(),
        };

        let inserted = match &resolved {
            ResolvedScope::Account => self.conn.execute(
                "INSERT INTO databases (id, rid, etag, ts) VALUES (?1, ?2, ?3, ?4);",
                params![id, rid, etag, ts],
            ),
            ResolvedScope::Database { rid: parent, .. } => self.conn.execute(
                "INSERT INTO collections (database_rid, id, rid, etag, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![parent, id, rid, etag, ts],
            ),
            ResolvedScope::Collection { rid: parent, .. } => self.conn.execute(
                "INSERT INTO documents (collection_rid, id, rid, body, etag, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![parent, id, rid, encode_body(&content)?, etag, ts],
            ),
        };

        if let Err(err) = inserted {
            let err = DbError::from(err);
            if err.is_constraint_violation() {
                warn!(
                    "event=resource_create module=client status=conflict kind={} scope={}",
                    resolved.child_kind(),
                    scope
                );
                return Err(ClientError::Conflict(format!(
                    "{} `{id}` already exists in {scope}",
                    resolved.child_kind()
                )));
            }
            return Err(err.into());
        }

        debug!(
            "event=resource_create module=client status=ok kind={} scope={}",
            resolved.child_kind(),
            scope
        );
        Ok(ResourceDescriptor {
            self_link: resolved.child_link(&id),
            id,
            rid,
            etag,
            ts,
            content,
        })
    }

    fn read_resource(&self, link: &ResourceLink) -> ClientResult<Option<ResourceDescriptor>> {
        match link.parse() {
            Some(LinkPath::Database { database }) => self.read_one(
                &format!("SELECT {DATABASE_COLUMNS} FROM databases d WHERE d.id = ?1;"),
                &[database],
                link,
            ),
            Some(LinkPath::Collection {
                database,
                collection,
            }) => self.read_one(
                &format!(
                    "SELECT {COLLECTION_COLUMNS}
                     FROM collections c
                     JOIN databases d ON d.rid = c.database_rid
                     WHERE d.id = ?1 AND c.id = ?2;"
                ),
                &[database, collection],
                link,
            ),
            Some(LinkPath::Document {
                database,
                collection,
                document,
            }) => self.read_one(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS}
                     FROM documents doc
                     JOIN collections c ON c.rid = doc.collection_rid
                     JOIN databases d ON d.rid = c.database_rid
                     WHERE d.id = ?1 AND c.id = ?2 AND doc.id = ?3;"
                ),
                &[database, collection, document],
                link,
            ),
            None => Err(malformed_link(link, "resource")),
        }
    }

    fn replace_resource(
        &self,
        link: &ResourceLink,
        content: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor> {
        let Some(LinkPath::Document {
            database,
            collection,
            document,
        }) = link.parse()
        else {
            return Err(ClientError::BadRequest(format!(
                "only documents can be replaced, got `{link}`"
            )));
        };

        if let Some(body_id) = content.get("id") {
            if body_id.as_str() != Some(document) {
                return Err(ClientError::BadRequest(format!(
                    "body id {body_id} does not match `{link}`"
                )));
            }
        }

        let Some(collection_rid) = self.collection_rid(database, collection)? else {
            return Err(ClientError::NotFound(link.clone()));
        };

        let stored_content = user_content(content);
        let etag = new_etag();
        let ts = now_epoch_secs();
        let rid: Option<String> = self
            .conn
            .query_row(
                "UPDATE documents
                 SET body = ?1, etag = ?2, ts = ?3
                 WHERE collection_rid = ?4 AND id = ?5
                 RETURNING rid;",
                params![
                    encode_body(&stored_content)?,
                    etag,
                    ts,
                    collection_rid,
                    document
                ],
                |row| row.get(0),
            )
            .optional()?;

        let Some(rid) = rid else {
            return Err(ClientError::NotFound(link.clone()));
        };

        debug!("event=resource_replace module=client status=ok link={link}");
        Ok(ResourceDescriptor {
            id: document.to_string(),
            rid,
            self_link: link.clone(),
            etag,
            ts,
            content: stored_content,
        })
    }
}

/// Binds the store to `master_key` on first use and checks it afterwards.
///
/// Only a fingerprint of the key is persisted.
pub fn authorize(conn: &Connection, endpoint: &str, master_key: &str) -> ClientResult<()> {
    let master_key = master_key.trim();
    if master_key.is_empty() {
        return Err(ClientError::Unauthorized(
            "master key cannot be empty".to_string(),
        ));
    }
    let fingerprint = key_fingerprint(master_key);

    let inserted = conn.execute(
        "INSERT INTO account (singleton, endpoint, key_fingerprint) VALUES (1, ?1, ?2)
         ON CONFLICT (singleton) DO NOTHING;",
        params![endpoint, fingerprint],
    )?;
    let bound: String = conn.query_row(
        "SELECT key_fingerprint FROM account WHERE singleton = 1;",
        [],
        |row| row.get(0),
    )?;

    if bound != fingerprint {
        warn!("event=authorize module=client status=error reason=key_mismatch");
        return Err(ClientError::Unauthorized(
            "master key does not match this store".to_string(),
        ));
    }

    let mode = if inserted == 1 { "bind" } else { "verify" };
    info!("event=authorize module=client status=ok mode={mode} endpoint={endpoint}");
    Ok(())
}

enum ResolvedScope {
    Account,
    Database { link: ResourceLink, rid: String },
    Collection { link: ResourceLink, rid: String },
}

impl ResolvedScope {
    fn child_link(&self, id: &str) -> ResourceLink {
        match self {
            Self::Account => ResourceLink::database(id),
            Self::Database { link, .. } => link.collection(id),
            Self::Collection { link, .. } => link.document(id),
        }
    }

    fn child_kind(&self) -> &'static str {
        match self {
            Self::Account => "database",
            Self::Database { .. } => "collection",
            Self::Collection { .. } => "document",
        }
    }
}

struct StoredRow {
    id: String,
    rid: String,
    etag: String,
    ts: i64,
    body: Option<String>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            rid: row.get(1)?,
            etag: row.get(2)?,
            ts: row.get(3)?,
            body: row.get(4)?,
        })
    }

    fn into_descriptor(self, self_link: ResourceLink) -> ClientResult<ResourceDescriptor> {
        let content = match self.body {
            Some(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(ClientError::InvalidData(format!(
                        "document `{}` body is not an object: {other}",
                        self.id
                    )));
                }
                Err(err) => {
                    return Err(ClientError::InvalidData(format!(
                        "document `{}` body is not valid JSON: {err}",
                        self.id
                    )));
                }
            },
            None => Map::new(),
        };

        Ok(ResourceDescriptor {
            id: self.id,
            rid: self.rid,
            self_link,
            etag: self.etag,
            ts: self.ts,
            content,
        })
    }
}

fn spec_id(spec: &Map<String, Value>) -> ClientResult<String> {
    match spec.get("id") {
        Some(Value::String(id)) if is_valid_resource_id(id) => Ok(id.clone()),
        Some(other) => Err(ClientError::BadRequest(format!(
            "invalid resource id {other}"
        ))),
        None => Err(ClientError::BadRequest(
            "resource spec has no `id`".to_string(),
        )),
    }
}

fn encode_body(content: &Map<String, Value>) -> ClientResult<String> {
    serde_json::to_string(content)
        .map_err(|err| ClientError::BadRequest(format!("unserializable document: {err}")))
}

fn malformed_link(link: &ResourceLink, expected: &str) -> ClientError {
    ClientError::BadRequest(format!("`{link}` is not a valid {expected} link"))
}

fn key_fingerprint(master_key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, master_key.as_bytes())
        .simple()
        .to_string()
}

fn new_etag() -> String {
    Uuid::new_v4().to_string()
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}
