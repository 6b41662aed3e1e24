//! Resource addressing for databases, collections and documents.
//!
//! # Responsibility
//! - Build and parse name-based resource links (`dbs/{db}/colls/{coll}/docs/{doc}`).
//! - Carry resolved database/collection identities between provisioner and repository.
//!
//! # Invariants
//! - A resource id is non-empty and never contains a link separator.
//! - A `ResourceLink` built through the constructors always parses back.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const DATABASES_SEGMENT: &str = "dbs";
const COLLECTIONS_SEGMENT: &str = "colls";
const DOCUMENTS_SEGMENT: &str = "docs";
const FORBIDDEN_ID_CHARS: [char; 4] = ['/', '\\', '?', '#'];

/// Address of one service-managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLink(String);

/// Parsed shape of a `ResourceLink`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPath<'a> {
    Database {
        database: &'a str,
    },
    Collection {
        database: &'a str,
        collection: &'a str,
    },
    Document {
        database: &'a str,
        collection: &'a str,
        document: &'a str,
    },
}

impl ResourceLink {
    /// Wraps a raw link string without validation.
    ///
    /// Use `parse()` before trusting its shape.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn database(database_id: &str) -> Self {
        Self(format!("{DATABASES_SEGMENT}/{database_id}"))
    }

    /// Link of collection `collection_id` under this database link.
    pub fn collection(&self, collection_id: &str) -> Self {
        Self(format!("{}/{COLLECTIONS_SEGMENT}/{collection_id}", self.0))
    }

    /// Link of document `document_id` under this collection link.
    pub fn document(&self, document_id: &str) -> Self {
        Self(format!("{}/{DOCUMENTS_SEGMENT}/{document_id}", self.0))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Parses the link into its addressed path.
    ///
    /// Returns `None` for any shape other than database, collection or
    /// document links, or when a segment is not a valid resource id.
    pub fn parse(&self) -> Option<LinkPath<'_>> {
        let segments = self.0.trim_matches('/').split('/').collect::<Vec<_>>();
        let path = match segments[..] {
            [DATABASES_SEGMENT, database] => LinkPath::Database { database },
            [DATABASES_SEGMENT, database, COLLECTIONS_SEGMENT, collection] => {
                LinkPath::Collection {
                    database,
                    collection,
                }
            }
            [DATABASES_SEGMENT, database, COLLECTIONS_SEGMENT, collection, DOCUMENTS_SEGMENT, document] => {
                LinkPath::Document {
                    database,
                    collection,
                    document,
                }
            }
            _ => return None,
        };

        let all_valid = segments
            .iter()
            .skip(1)
            .step_by(2)
            .all(|segment| is_valid_resource_id(segment));
        all_valid.then_some(path)
    }
}

impl Display for ResourceLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns whether `id` can name a database, collection or document.
pub fn is_valid_resource_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.contains(FORBIDDEN_ID_CHARS)
}

/// Resolved identity of a logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRef {
    /// Caller-chosen name.
    pub id: String,
    /// Service-assigned resource id.
    pub rid: String,
    pub self_link: ResourceLink,
}

/// Resolved identity of a collection scoped under a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: String,
    pub rid: String,
    pub self_link: ResourceLink,
}

#[cfg(test)]
mod tests {
    use super::{is_valid_resource_id, LinkPath, ResourceLink};

    #[test]
    fn nested_links_parse_back_to_their_path() {
        let database = ResourceLink::database("ToDoList");
        let collection = database.collection("Items");
        let document = collection.document("task-1");

        assert_eq!(document.as_str(), "dbs/ToDoList/colls/Items/docs/task-1");
        assert_eq!(
            document.parse(),
            Some(LinkPath::Document {
                database: "ToDoList",
                collection: "Items",
                document: "task-1",
            })
        );
        assert_eq!(
            collection.parse(),
            Some(LinkPath::Collection {
                database: "ToDoList",
                collection: "Items",
            })
        );
    }

    #[test]
    fn malformed_links_do_not_parse() {
        assert!(ResourceLink::from_raw("dbs").parse().is_none());
        assert!(ResourceLink::from_raw("dbs/a/docs/b").parse().is_none());
        assert!(ResourceLink::from_raw("dbs/ /colls/x").parse().is_none());
        assert!(ResourceLink::database("a")
            .collection("b")
            .document("c/d")
            .parse()
            .is_none());
    }

    #[test]
    fn resource_ids_reject_separators_and_blank_values() {
        assert!(is_valid_resource_id("Items"));
        assert!(!is_valid_resource_id("   "));
        assert!(!is_valid_resource_id("a/b"));
        assert!(!is_valid_resource_id("a?b"));
    }
}
