use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw file as handed over by the upload route.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub content: Bytes,
    pub original_name: String,
    pub mime_type: String,
}

impl FileUpload {
    pub fn new(
        content: impl Into<Bytes>,
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            original_name: original_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Lowercase extension without the dot, empty when the name has none.
    pub fn extension(&self) -> String {
        split_name(&self.original_name).1.to_ascii_lowercase()
    }

    /// `{baseName}.{uuid}{ext}` with the base name reduced to a safe charset.
    pub fn stored_filename(&self, id: &Uuid) -> String {
        let (base, extension) = split_name(&self.original_name);

        let safe_base = base
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        let safe_base = if safe_base.is_empty() {
            "file".to_string()
        } else {
            safe_base
        };

        if extension.is_empty() {
            format!("{}.{}", safe_base, id)
        } else {
            format!("{}.{}.{}", safe_base, id, extension.to_ascii_lowercase())
        }
    }
}

fn split_name(name: &str) -> (&str, &str) {
    let file_name = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    match file_name.rfind('.') {
        Some(0) | None => (file_name, ""),
        Some(idx) => (&file_name[..idx], &file_name[idx + 1..]),
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: FileUpload,
    pub folder: String,
    pub description: Option<String>,
    pub uploaded_by: String,
    /// Repeating a key within the same folder returns the earlier file
    /// instead of writing a second copy.
    pub idempotency_key: Option<String>,
}

impl UploadRequest {
    pub fn new(file: FileUpload, folder: impl Into<String>, uploaded_by: impl Into<String>) -> Self {
        Self {
            file,
            folder: folder.into(),
            description: None,
            uploaded_by: uploaded_by.into(),
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub file: Option<StorageFile>,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn ok(file: StorageFile) -> Self {
        Self {
            success: true,
            file: Some(file),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            file: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileUpdate {
    pub description: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageFile {
    pub id: Uuid,
    pub original_name: String,
    pub stored_filename: String,
    pub folder: String,
    pub relative_path: String,
    /// Name of the provider that accepted the write.
    pub provider: String,
    pub provider_path: String,
    pub size: u64,
    pub mime_type: String,
    pub description: Option<String>,
    pub uploaded_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
