//! Get-or-create provisioning for databases and collections.
//!
//! # Responsibility
//! - Resolve a named database/collection to its identity, creating it if absent.
//!
//! # Invariants
//! - Existence is checked by exact id match before any create is issued.
//! - A query failure is returned unchanged and never followed by a create.
//! - When several resources match, the first one wins; extras are ignored.
//! - A create that loses a race (`Conflict`) resolves to the existing resource.

use crate::client::{
    ClientError, ClientResult, DocumentClient, QuerySpec, ResourceDescriptor, Scope,
};
use crate::model::resource::{CollectionRef, DatabaseRef};
use log::{info, warn};
use serde_json::{Map, Value};

/// Returns the database named `database_id`, creating it when missing.
pub fn get_or_create_database<C>(client: &C, database_id: &str) -> ClientResult<DatabaseRef>
where
    C: DocumentClient + ?Sized,
{
    get_or_create(client, &Scope::Account, "database", database_id)
        .map(|descriptor| descriptor.to_database_ref())
}

/// Returns collection `collection_id` under `database`, creating it when missing.
pub fn get_or_create_collection<C>(
    client: &C,
    database: &DatabaseRef,
    collection_id: &str,
) -> ClientResult<CollectionRef>
where
    C: DocumentClient + ?Sized,
{
    let scope = Scope::Database(database.self_link.clone());
    get_or_create(client, &scope, "collection", collection_id)
        .map(|descriptor| descriptor.to_collection_ref())
}

fn get_or_create<C>(
    client: &C,
    scope: &Scope,
    kind: &str,
    id: &str,
) -> ClientResult<ResourceDescriptor>
where
    C: DocumentClient + ?Sized,
{
    let query = QuerySpec::by_id(id);
    if let Some(existing) = first_match(client, scope, &query)? {
        info!("event=provision module=repo status=ok kind={kind} id={id} created=false");
        return Ok(existing);
    }

    let mut spec = Map::new();
    spec.insert("id".to_string(), Value::String(id.to_string()));

    match client.create_resource(scope, &spec) {
        Ok(created) => {
            info!("event=provision module=repo status=ok kind={kind} id={id} created=true");
            Ok(created)
        }
        Err(ClientError::Conflict(message)) => {
            // Another writer created it between our query and create.
            warn!("event=provision module=repo status=conflict kind={kind} id={id}");
            first_match(client, scope, &query)?.ok_or(ClientError::Conflict(message))
        }
        Err(err) => Err(err),
    }
}

fn first_match<C>(
    client: &C,
    scope: &Scope,
    query: &QuerySpec,
) -> ClientResult<Option<ResourceDescriptor>>
where
    C: DocumentClient + ?Sized,
{
    Ok(client.query_resources(scope, query)?.into_iter().next())
}
