use sqlx::{postgres::PgRow, FromRow, Row};

use crate::application::dto::storage_file_dto::StorageFileDTO;

impl FromRow<'_, PgRow> for StorageFileDTO {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let size: i64 = row.try_get("size")?;

        Ok(StorageFileDTO {
            id: row.try_get("id")?,
            original_name: Some(row.try_get("original_name")?),
            stored_filename: Some(row.try_get("stored_filename")?),
            folder: Some(row.try_get("folder")?),
            relative_path: Some(row.try_get("relative_path")?),
            provider: Some(row.try_get("provider")?),
            provider_path: Some(row.try_get("provider_path")?),
            size: Some(size.max(0) as u64),
            mime_type: Some(row.try_get("mime_type")?),
            description: row.try_get("description")?,
            uploaded_by: Some(row.try_get("uploaded_by")?),
            updated_by: row.try_get("updated_by")?,
            created_at: Some(row.try_get("created_at")?),
            updated_at: Some(row.try_get("updated_at")?),
        })
    }
}
