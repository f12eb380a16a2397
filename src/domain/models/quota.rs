use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum QuotaScope {
    Folder(String),
    Uploader(String),
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaScope::Folder(name) => write!(f, "folder:{}", name),
            QuotaScope::Uploader(name) => write!(f, "uploader:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub scope: QuotaScope,
    pub limit_bytes: Option<u64>,
    pub used_bytes: u64,
}

impl Quota {
    pub fn remaining(&self) -> Option<u64> {
        self.limit_bytes
            .map(|limit| limit.saturating_sub(self.used_bytes))
    }
}
