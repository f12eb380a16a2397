use async_trait::async_trait;
use aws_sdk_s3::{
    config::{http::HttpResponse, retry::RetryConfig, BehaviorVersion, Builder, Credentials, Region},
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    application::services::storage_backend::{BackendObject, StorageBackend},
    domain::config::{credentials::S3Credentials, storage::ProviderType},
    services::error::{BackendError, BackendErrorKind},
};

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub prefix: Option<String>,
}

/// Objects in one S3 (or S3-compatible) bucket. Locators are full object
/// keys, including the configured prefix.
pub struct S3StorageBackend {
    name: String,
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3StorageBackend {
    pub fn new(name: impl Into<String>, settings: S3Settings, credentials: S3Credentials) -> Self {
        let name = name.into();
        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(Credentials::new(
                credentials.access_key_id,
                credentials.secret_access_key,
                credentials.session_token,
                None,
                "civic-storage",
            ))
            .force_path_style(settings.force_path_style)
            // Retries are owned by the resilience layer.
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            "S3 storage '{}' configured: bucket={}, region={}",
            name, settings.bucket, settings.region
        );

        Self {
            name,
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket,
            prefix: normalize_prefix(settings.prefix.as_deref()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.trim_start_matches('/'))
    }

    fn map_error<E>(&self, locator: &str, error: SdkError<E, HttpResponse>) -> BackendError
    where
        E: ProvideErrorMetadata + std::fmt::Debug,
    {
        match &error {
            SdkError::TimeoutError(_) => {
                BackendError::timeout(&self.name, format!("request to {} timed out", locator))
            }
            SdkError::DispatchFailure(failure) if failure.is_timeout() => {
                BackendError::timeout(&self.name, format!("request to {} timed out", locator))
            }
            SdkError::DispatchFailure(failure) => BackendError::network(
                &self.name,
                format!("dispatch failure for {}: {:?}", locator, failure),
            ),
            SdkError::ResponseError(_) => BackendError::network(
                &self.name,
                format!("unreadable response for {}: connection reset", locator),
            ),
            SdkError::ServiceError(service) => {
                let status = service.raw().status().as_u16();
                let kind = match status {
                    404 => BackendErrorKind::NotFound,
                    401 | 403 => BackendErrorKind::Unauthorized,
                    _ => BackendErrorKind::Provider,
                };
                let message = service
                    .err()
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} failed with status {}", locator, status));
                let mut mapped = BackendError::new(&self.name, kind, message).with_status(status);
                if let Some(code) = service.err().code() {
                    mapped = mapped.with_code(code);
                }
                mapped
            }
            _ => BackendError::new(
                &self.name,
                BackendErrorKind::Internal,
                format!("{:?}", error),
            ),
        }
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/", p),
        _ => String::new(),
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl StorageBackend for S3StorageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::S3
    }

    async fn put(&self, key: &str, content: Bytes, mime_type: &str) -> Result<String, BackendError> {
        let full_key = self.full_key(key);
        let size = content.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .content_type(mime_type)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| self.map_error(&full_key, e))?;

        debug!("Uploaded {} bytes to s3://{}/{}", size, self.bucket, full_key);
        Ok(full_key)
    }

    async fn get(&self, locator: &str) -> Result<Bytes, BackendError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(locator)
            .send()
            .await
            .map_err(|e| self.map_error(locator, e))?;

        let data = response.body.collect().await.map_err(|e| {
            BackendError::network(&self.name, format!("failed to read object body: {}", e))
        })?;
        Ok(data.into_bytes())
    }

    async fn delete(&self, locator: &str) -> Result<(), BackendError> {
        // S3 deletes are idempotent; check first so a missing object is reported.
        if !self.exists(locator).await? {
            return Err(BackendError::not_found(&self.name, locator));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(locator)
            .send()
            .await
            .map_err(|e| self.map_error(locator, e))?;

        debug!("Deleted s3://{}/{}", self.bucket, locator);
        Ok(())
    }

    async fn exists(&self, locator: &str) -> Result<bool, BackendError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(locator)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let mapped = self.map_error(locator, e);
                if mapped.is_not_found() {
                    Ok(false)
                } else {
                    Err(mapped)
                }
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BackendObject>, BackendError> {
        let mut full_prefix = self.full_key(prefix);
        if !full_prefix.is_empty() && !full_prefix.ends_with('/') {
            full_prefix.push('/');
        }

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| self.map_error(&full_prefix, e))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    objects.push(BackendObject {
                        locator: key.to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                        last_modified: object.last_modified().and_then(to_chrono),
                    });
                }
            }

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| self.map_error(&self.bucket, e))?;
        Ok(())
    }
}
