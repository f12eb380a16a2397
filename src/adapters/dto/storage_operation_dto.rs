use sqlx::{postgres::PgRow, FromRow, Row};

use crate::domain::models::operation::{OperationKind, StorageOperation};

pub fn parse_operation_kind(value: &str) -> Result<OperationKind, sqlx::Error> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| {
        sqlx::Error::Decode(format!("unknown operation kind '{}': {}", value, e).into())
    })
}

impl FromRow<'_, PgRow> for StorageOperation {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;

        Ok(StorageOperation {
            id: row.try_get("id")?,
            kind: parse_operation_kind(&kind)?,
            path: row.try_get("path")?,
            user_id: row.try_get("user_id")?,
            timestamp: row.try_get("timestamp")?,
            success: row.try_get("success")?,
            error: row.try_get("error")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operation_kind() {
        assert_eq!(parse_operation_kind("orphan_cleanup").unwrap(), OperationKind::OrphanCleanup);
        assert!(parse_operation_kind("rename").is_err());
    }
}
