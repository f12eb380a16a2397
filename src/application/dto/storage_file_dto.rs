use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::file::{FileUpdate, StorageFile};

/// Partial view of a storage file row. `None` fields are left untouched by
/// updates.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageFileDTO {
    #[serde(default)]
    pub id: Uuid,
    pub original_name: Option<String>,
    pub stored_filename: Option<String>,
    pub folder: Option<String>,
    pub relative_path: Option<String>,
    pub provider: Option<String>,
    pub provider_path: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    pub uploaded_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StorageFileDTO {
    pub fn from_update(id: Uuid, update: FileUpdate) -> Self {
        StorageFileDTO {
            id,
            description: update.description,
            updated_by: update.updated_by,
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Moves a row to another folder, as done by the archive lifecycle action.
    pub fn relocation(id: Uuid, folder: &str, relative_path: &str, provider_path: &str) -> Self {
        StorageFileDTO {
            id,
            folder: Some(folder.to_string()),
            relative_path: Some(relative_path.to_string()),
            provider_path: Some(provider_path.to_string()),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// True when no column besides the timestamp would change.
    pub fn is_empty(&self) -> bool {
        self.original_name.is_none()
            && self.stored_filename.is_none()
            && self.folder.is_none()
            && self.relative_path.is_none()
            && self.provider.is_none()
            && self.provider_path.is_none()
            && self.size.is_none()
            && self.mime_type.is_none()
            && self.description.is_none()
            && self.uploaded_by.is_none()
            && self.updated_by.is_none()
    }

    pub fn sanitize(&mut self) {
        if let Some(size) = self.size {
            self.size = Some(std::cmp::min(size, i64::MAX as u64));
        }
        if let Some(description) = &self.description {
            let trimmed = description.trim();
            self.description = Some(trimmed.to_string());
        }
    }

    /// Applies the present fields onto an existing file.
    pub fn merge_into(self, mut file: StorageFile) -> StorageFile {
        if let Some(v) = self.original_name {
            file.original_name = v;
        }
        if let Some(v) = self.stored_filename {
            file.stored_filename = v;
        }
        if let Some(v) = self.folder {
            file.folder = v;
        }
        if let Some(v) = self.relative_path {
            file.relative_path = v;
        }
        if let Some(v) = self.provider {
            file.provider = v;
        }
        if let Some(v) = self.provider_path {
            file.provider_path = v;
        }
        if let Some(v) = self.size {
            file.size = v;
        }
        if let Some(v) = self.mime_type {
            file.mime_type = v;
        }
        if self.description.is_some() {
            file.description = self.description;
        }
        if let Some(v) = self.uploaded_by {
            file.uploaded_by = v;
        }
        if self.updated_by.is_some() {
            file.updated_by = self.updated_by;
        }
        file.updated_at = self.updated_at.unwrap_or_else(Utc::now);
        file
    }
}

impl From<StorageFile> for StorageFileDTO {
    fn from(value: StorageFile) -> Self {
        StorageFileDTO {
            id: value.id,
            original_name: Some(value.original_name),
            stored_filename: Some(value.stored_filename),
            folder: Some(value.folder),
            relative_path: Some(value.relative_path),
            provider: Some(value.provider),
            provider_path: Some(value.provider_path),
            size: Some(value.size),
            mime_type: Some(value.mime_type),
            description: value.description,
            uploaded_by: Some(value.uploaded_by),
            updated_by: value.updated_by,
            created_at: Some(value.created_at),
            updated_at: Some(value.updated_at),
        }
    }
}

impl From<StorageFileDTO> for StorageFile {
    fn from(value: StorageFileDTO) -> Self {
        let now = Utc::now();
        StorageFile {
            id: value.id,
            original_name: value.original_name.unwrap_or_default(),
            stored_filename: value.stored_filename.unwrap_or_default(),
            folder: value.folder.unwrap_or_default(),
            relative_path: value.relative_path.unwrap_or_default(),
            provider: value.provider.unwrap_or_default(),
            provider_path: value.provider_path.unwrap_or_default(),
            size: value.size.unwrap_or(0),
            mime_type: value.mime_type.unwrap_or_default(),
            description: value.description,
            uploaded_by: value.uploaded_by.unwrap_or_default(),
            updated_by: value.updated_by,
            created_at: value.created_at.unwrap_or(now),
            updated_at: value.updated_at.unwrap_or(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StorageFile {
        let now = Utc::now();
        StorageFile {
            id: Uuid::new_v4(),
            original_name: "notice.pdf".to_string(),
            stored_filename: "notice.x.pdf".to_string(),
            folder: "public".to_string(),
            relative_path: "public/notice.x.pdf".to_string(),
            provider: "local".to_string(),
            provider_path: "public/notice.x.pdf".to_string(),
            size: 10,
            mime_type: "application/pdf".to_string(),
            description: None,
            uploaded_by: "clerk".to_string(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_update_touches_only_given_fields() {
        let file = sample();
        let mut dto = StorageFileDTO::from_update(
            file.id,
            FileUpdate {
                description: Some("  Public notice  ".to_string()),
                updated_by: Some("editor".to_string()),
            },
        );
        dto.sanitize();
        assert!(!dto.is_empty());

        let updated = dto.merge_into(file.clone());
        assert_eq!(updated.description.as_deref(), Some("Public notice"));
        assert_eq!(updated.updated_by.as_deref(), Some("editor"));
        assert_eq!(updated.original_name, file.original_name);
        assert_eq!(updated.created_at, file.created_at);
    }

    #[test]
    fn test_empty_update() {
        let dto = StorageFileDTO::from_update(Uuid::new_v4(), FileUpdate::default());
        assert!(dto.is_empty());
    }
}
