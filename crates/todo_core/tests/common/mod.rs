#![allow(dead_code)]

use rusqlite::ffi;
use serde_json::{Map, Value};
use std::cell::Cell;
use todo_core::db::DbError;
use todo_core::{
    ClientError, ClientResult, DocumentClient, QuerySpec, ResourceDescriptor, ResourceLink, Scope,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Create,
    Read,
    Replace,
}

/// Wraps a client, counting calls and injecting failures on demand.
pub struct RecordingClient<C> {
    inner: C,
    queries: Cell<usize>,
    creates: Cell<usize>,
    fail_next: Cell<Option<Operation>>,
    stale_next_query: Cell<bool>,
}

impl<C: DocumentClient> RecordingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            queries: Cell::new(0),
            creates: Cell::new(0),
            fail_next: Cell::new(None),
            stale_next_query: Cell::new(false),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    pub fn creates(&self) -> usize {
        self.creates.get()
    }

    /// Makes the next call of `operation` fail with a busy-store error.
    pub fn fail_next(&self, operation: Operation) {
        self.fail_next.set(Some(operation));
    }

    /// Makes the next query report no matches, as a lagging reader would.
    pub fn stale_next_query(&self) {
        self.stale_next_query.set(true);
    }

    fn check(&self, operation: Operation) -> ClientResult<()> {
        if self.fail_next.get() == Some(operation) {
            self.fail_next.set(None);
            return Err(busy_error());
        }
        Ok(())
    }
}

impl<C: DocumentClient> DocumentClient for RecordingClient<C> {
    fn query_resources(
        &self,
        scope: &Scope,
        query: &QuerySpec,
    ) -> ClientResult<Vec<ResourceDescriptor>> {
        self.queries.set(self.queries.get() + 1);
        self.check(Operation::Query)?;
        if self.stale_next_query.replace(false) {
            return Ok(Vec::new());
        }
        self.inner.query_resources(scope, query)
    }

    fn create_resource(
        &self,
        scope: &Scope,
        spec: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor> {
        self.creates.set(self.creates.get() + 1);
        self.check(Operation::Create)?;
        self.inner.create_resource(scope, spec)
    }

    fn read_resource(&self, link: &ResourceLink) -> ClientResult<Option<ResourceDescriptor>> {
        self.check(Operation::Read)?;
        self.inner.read_resource(link)
    }

    fn replace_resource(
        &self,
        link: &ResourceLink,
        content: &Map<String, Value>,
    ) -> ClientResult<ResourceDescriptor> {
        self.check(Operation::Replace)?;
        self.inner.replace_resource(link, content)
    }
}

pub fn busy_error() -> ClientError {
    ClientError::Store(DbError::Sqlite(rusqlite::Error::SqliteFailure(
        ffi::Error::new(ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    )))
}

pub fn is_busy_error(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Store(DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)))
            if failure.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}
