//! To-do task projection over a generic `Item`.

use crate::model::item::Item;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One to-do entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Creation time in unix epoch milliseconds.
    pub date: i64,
    pub completed: bool,
}

impl Task {
    /// Creates an open task with a generated id, stamped with the current time.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            category: category.into(),
            date: now_epoch_ms(),
            completed: false,
        }
    }

    pub fn to_item(&self) -> Item {
        Item::new(self.id.clone())
            .with("name", self.name.clone())
            .with("category", self.category.clone())
            .with("date", self.date)
            .with("completed", self.completed)
    }

    /// Projects a stored item into a task.
    ///
    /// Service metadata and unknown fields are ignored.
    ///
    /// # Errors
    /// - Returns a message when a task field is missing or mistyped.
    pub fn from_item(item: &Item) -> Result<Self, String> {
        serde_json::from_value(Value::Object(item.to_body()))
            .map_err(|err| format!("item `{}` is not a task: {err}", item.id))
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
