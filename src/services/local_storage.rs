use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    application::services::storage_backend::{BackendObject, StorageBackend},
    domain::config::storage::ProviderType,
    services::error::{BackendError, BackendErrorKind},
};

const TEMP_MARKER: &str = ".tmp-";

/// Files under a base directory. Locators are `/`-separated paths relative to
/// the base directory.
pub struct LocalStorageBackend {
    name: String,
    base_path: PathBuf,
}

impl LocalStorageBackend {
    pub fn new(name: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates the base directory and one directory per folder path.
    pub async fn prepare<'a>(
        &self,
        folders: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), BackendError> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| BackendError::from_io(&self.name, e))?;
        for folder in folders {
            let dir = self.resolve(folder)?;
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| BackendError::from_io(&self.name, e))?;
        }
        info!(
            "Local storage '{}' ready at {}",
            self.name,
            self.base_path.display()
        );
        Ok(())
    }

    /// Maps a locator onto the filesystem, refusing anything that would
    /// escape the base directory.
    fn resolve(&self, locator: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(locator.trim_start_matches('/'));
        let mut path = self.base_path.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(BackendError::new(
                        &self.name,
                        BackendErrorKind::Internal,
                        format!("invalid storage path '{}'", locator),
                    ))
                }
            }
        }
        Ok(path)
    }

    fn locator_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Local
    }

    async fn put(&self, key: &str, content: Bytes, _mime_type: &str) -> Result<String, BackendError> {
        let target = self.resolve(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::from_io(&self.name, e))?;
        }

        // Write next to the target and rename so readers never see a partial file.
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = target.with_file_name(format!(".{}{}{}", file_name, TEMP_MARKER, Uuid::new_v4()));

        if let Err(e) = fs::write(&temp, &content).await {
            let _ = fs::remove_file(&temp).await;
            return Err(BackendError::from_io(&self.name, e));
        }
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(BackendError::from_io(&self.name, e));
        }

        debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(self.locator_for(&target).unwrap_or_else(|| key.to_string()))
    }

    async fn get(&self, locator: &str) -> Result<Bytes, BackendError> {
        let path = self.resolve(locator)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::not_found(&self.name, locator))
            }
            Err(e) => Err(BackendError::from_io(&self.name, e)),
        }
    }

    async fn delete(&self, locator: &str) -> Result<(), BackendError> {
        let path = self.resolve(locator)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::not_found(&self.name, locator))
            }
            Err(e) => Err(BackendError::from_io(&self.name, e)),
        }
    }

    async fn exists(&self, locator: &str) -> Result<bool, BackendError> {
        let path = self.resolve(locator)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| BackendError::from_io(&self.name, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BackendObject>, BackendError> {
        let root = self.resolve(prefix)?;
        let mut objects = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BackendError::from_io(&self.name, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| BackendError::from_io(&self.name, e))?
            {
                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| BackendError::from_io(&self.name, e))?;

                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().contains(TEMP_MARKER) {
                    continue;
                }
                if let Some(locator) = self.locator_for(&path) {
                    objects.push(BackendObject {
                        locator,
                        size: metadata.len(),
                        last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                    });
                }
            }
        }

        objects.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(objects)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let metadata = fs::metadata(&self.base_path)
            .await
            .map_err(|e| BackendError::from_io(&self.name, e))?;
        if !metadata.is_dir() {
            return Err(BackendError::provider_error(
                &self.name,
                format!("{} is not a directory", self.base_path.display()),
            ));
        }
        Ok(())
    }
}
