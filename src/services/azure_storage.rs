use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, info};

use crate::{
    application::services::storage_backend::{BackendObject, StorageBackend},
    domain::config::{credentials::AzureCredentials, storage::ProviderType},
    services::error::{BackendError, BackendErrorKind},
};

const API_VERSION: &str = "2021-08-06";

/// Blobs in one Azure Storage container, addressed over the Blob REST API
/// with a SAS token. Locators are blob names.
pub struct AzureStorageBackend {
    name: String,
    client: Client,
    container_url: Url,
    sas_token: String,
}

impl AzureStorageBackend {
    pub fn new(
        name: impl Into<String>,
        account: &str,
        container: &str,
        endpoint: Option<&str>,
        credentials: AzureCredentials,
    ) -> Result<Self, BackendError> {
        let name = name.into();
        let endpoint = endpoint
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", account));

        let mut container_url = Url::parse(&endpoint).map_err(|e| {
            BackendError::new(
                &name,
                BackendErrorKind::InvalidCredentials,
                format!("invalid Azure endpoint '{}': {}", endpoint, e),
            )
        })?;
        container_url
            .path_segments_mut()
            .map_err(|_| {
                BackendError::new(
                    &name,
                    BackendErrorKind::InvalidCredentials,
                    format!("Azure endpoint '{}' cannot hold a path", endpoint),
                )
            })?
            .pop_if_empty()
            .push(container);

        info!(
            "Azure storage '{}' configured: container={}",
            name, container_url
        );

        Ok(Self {
            name,
            client: Client::new(),
            container_url,
            sas_token: credentials.sas_token.trim_start_matches('?').to_string(),
        })
    }

    fn blob_url(&self, blob: &str) -> Result<Url, BackendError> {
        let mut url = self.container_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                BackendError::new(&self.name, BackendErrorKind::Internal, "invalid container url")
            })?;
            for part in blob.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
        }
        self.sign(&mut url);
        Ok(url)
    }

    fn sign(&self, url: &mut Url) {
        if !self.sas_token.is_empty() {
            url.set_query(Some(&self.sas_token));
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }

    async fn send(&self, locator: &str, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&self.name, e))?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(self.error_from_response(locator, response).await)
    }

    async fn error_from_response(&self, locator: &str, response: Response) -> BackendError {
        let status = response.status();
        let code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let kind = match status {
            StatusCode::NOT_FOUND => BackendErrorKind::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorKind::Unauthorized,
            _ => BackendErrorKind::Provider,
        };
        let detail = first_tag(&body, "Message").unwrap_or_else(|| status.to_string());
        let mut error = BackendError::new(&self.name, kind, format!("{}: {}", locator, detail))
            .with_status(status.as_u16());
        if let Some(code) = code.or_else(|| first_tag(&body, "Code")) {
            error = error.with_code(code);
        }
        error
    }
}

/// Every `<tag ...>body</tag>` in `xml` as `(attributes, body)`. Self-closing
/// elements yield an empty body.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<(&'a str, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after_name = &rest[start + open.len()..];
        let boundary = after_name.chars().next();
        if !matches!(boundary, Some(c) if c == '>' || c == '/' || c.is_whitespace()) {
            rest = after_name;
            continue;
        }
        let Some(tag_end) = after_name.find('>') else {
            break;
        };
        let attributes = &after_name[..tag_end];
        let after_tag = &after_name[tag_end + 1..];
        if attributes.ends_with('/') {
            found.push((attributes.trim_end_matches('/').trim(), ""));
            rest = after_tag;
            continue;
        }
        match after_tag.find(&close) {
            Some(end) => {
                found.push((attributes.trim(), &after_tag[..end]));
                rest = &after_tag[end + close.len()..];
            }
            None => break,
        }
    }
    found
}

/// Text of every `tag` element in `xml`, entity-decoded.
fn tag_values(xml: &str, tag: &str) -> Vec<String> {
    elements(xml, tag)
        .into_iter()
        .map(|(_, body)| decode_entities(body))
        .collect()
}

fn first_tag(xml: &str, tag: &str) -> Option<String> {
    tag_values(xml, tag).into_iter().next()
}

fn decode_entities(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let entity = candidate
            .find(';')
            .and_then(|end| decode_entity(&candidate[1..end]).map(|c| (c, end)));
        match entity {
            Some((c, end)) => {
                decoded.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Azure marks names with characters invalid in XML as `Encoded="true"` and
/// percent-encodes them.
fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn blob_name(blob: &str) -> Option<String> {
    let (attributes, body) = elements(blob, "Name").into_iter().next()?;
    let name = decode_entities(body);
    let encoded = attributes
        .split_whitespace()
        .any(|a| a.eq_ignore_ascii_case("Encoded=\"true\""));
    let name = if encoded { percent_decode(&name)? } else { name };
    Some(name).filter(|n| !n.is_empty())
}

/// Parses one list page. A blob without a readable name fails the page, so
/// callers never act on a partial listing.
fn parse_blob_list(xml: &str) -> Result<(Vec<BackendObject>, Option<String>), String> {
    let blobs = elements(xml, "Blob")
        .into_iter()
        .map(|(_, blob)| {
            let locator = blob_name(blob)
                .ok_or_else(|| format!("unreadable blob name in list response: {}", blob.trim()))?;
            let size = first_tag(blob, "Content-Length")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            let last_modified = first_tag(blob, "Last-Modified")
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|d| d.with_timezone(&Utc));
            Ok(BackendObject {
                locator,
                size,
                last_modified,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    let marker = first_tag(xml, "NextMarker").filter(|m| !m.is_empty());
    Ok((blobs, marker))
}

#[async_trait]
impl StorageBackend for AzureStorageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Azure
    }

    async fn put(&self, key: &str, content: Bytes, mime_type: &str) -> Result<String, BackendError> {
        let blob = key.trim_start_matches('/').to_string();
        let size = content.len();
        let request = self
            .request(Method::PUT, self.blob_url(&blob)?)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", mime_type)
            .body(content);

        self.send(&blob, request).await?;
        debug!("Uploaded {} bytes to Azure blob {}", size, blob);
        Ok(blob)
    }

    async fn get(&self, locator: &str) -> Result<Bytes, BackendError> {
        let response = self
            .send(locator, self.request(Method::GET, self.blob_url(locator)?))
            .await?;
        response
            .bytes()
            .await
            .map_err(|e| BackendError::network(&self.name, format!("failed to read blob: {}", e)))
    }

    async fn delete(&self, locator: &str) -> Result<(), BackendError> {
        self.send(locator, self.request(Method::DELETE, self.blob_url(locator)?))
            .await?;
        debug!("Deleted Azure blob {}", locator);
        Ok(())
    }

    async fn exists(&self, locator: &str) -> Result<bool, BackendError> {
        match self
            .send(locator, self.request(Method::HEAD, self.blob_url(locator)?))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BackendObject>, BackendError> {
        let mut blob_prefix = prefix.trim_matches('/').to_string();
        if !blob_prefix.is_empty() {
            blob_prefix.push('/');
        }

        let mut objects = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut url = self.container_url.clone();
            self.sign(&mut url);
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("restype", "container")
                    .append_pair("comp", "list")
                    .append_pair("prefix", &blob_prefix);
                if let Some(marker) = &marker {
                    query.append_pair("marker", marker);
                }
            }

            let body = self
                .send(&blob_prefix, self.request(Method::GET, url))
                .await?
                .text()
                .await
                .map_err(|e| BackendError::from_reqwest(&self.name, e))?;

            let (page, next) = parse_blob_list(&body)
                .map_err(|e| BackendError::provider_error(&self.name, e))?;
            objects.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let mut url = self.container_url.clone();
        self.sign(&mut url);
        url.query_pairs_mut().append_pair("restype", "container");
        self.send("container", self.request(Method::GET, url)).await?;
        Ok(())
    }
}
