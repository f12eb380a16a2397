use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upload,
    Download,
    List,
    Update,
    Delete,
    Expire,
    Archive,
    OrphanCleanup,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::List => "list",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Expire => "expire",
            OperationKind::Archive => "archive",
            OperationKind::OrphanCleanup => "orphan_cleanup",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageOperation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub path: String,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl StorageOperation {
    pub fn new(kind: OperationKind, path: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            path: path.into(),
            user_id,
            timestamp: Utc::now(),
            success: true,
            error: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.metadata {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn failed(mut self, error: impl fmt::Display) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }
}
