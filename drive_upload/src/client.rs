//! Google Drive API client used by the sync.

use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::api::{DriveApi, ListFilter};
use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::{
    format_size, ApiErrorResponse, FileListResponse, FileMetadata, Owner, OwnersResponse,
    FOLDER_MIME_TYPE,
};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Files up to this size are sent in a single request.
const SIMPLE_UPLOAD_LIMIT: u64 = 5 * 1024 * 1024;

/// Chunk size for resumable uploads (must be a multiple of 256 KiB).
const CHUNK_SIZE: u64 = 1024 * 1024;

const FILE_FIELDS: &str = "id, name, mimeType, size";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size)";
const PAGE_SIZE: &str = "1000";

/// How often and how patiently failed requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_RETRIES: u32 = 5;

    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }

    /// Backoff before retry number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETRIES)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Escape a value for use inside a single quoted Drive query string.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn list_query(folder_id: &str, filter: ListFilter, account_email: &str) -> String {
    let mut query = format!(
        "'{}' in parents and trashed = false",
        escape_query_value(folder_id)
    );
    let owner = escape_query_value(account_email);
    match filter {
        ListFilter::All => {}
        ListFilter::OwnedFiles => query.push_str(&format!(
            " and '{}' in owners and mimeType != '{}'",
            owner, FOLDER_MIME_TYPE
        )),
        ListFilter::OwnedFolders => query.push_str(&format!(
            " and '{}' in owners and mimeType = '{}'",
            owner, FOLDER_MIME_TYPE
        )),
    }
    query
}

/// Turn a non-success response into an [`DriveError::ApiError`].
async fn api_error(response: Response) -> DriveError {
    let status = response.status();
    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        };
    }
    DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    }
}

async fn into_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(api_error(response).await)
    }
}

/// Offset of the next byte the server expects, from a `Range: bytes=0-N`
/// header on a resumable upload status response.
fn next_offset(response: &Response) -> u64 {
    response
        .headers()
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('-').next())
        .and_then(|last| last.trim().parse::<u64>().ok())
        .map(|last| last + 1)
        .unwrap_or(0)
}

/// Client for the Google Drive v3 REST API.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    api_base: String,
    upload_base: String,
    retry: RetryPolicy,
}

impl DriveClient {
    /// Create a new DriveClient talking to the public Google endpoints.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at different API endpoints.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send a request, rebuilding and resending it on connection errors,
    /// 429 and 5xx responses. Any other response is returned as is.
    async fn send_with_retry<F, Fut>(&self, build: F) -> Result<Response>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<RequestBuilder>>,
    {
        let mut attempt = 0;
        loop {
            let token = self.auth.get_access_token().await?;
            let can_retry = attempt < self.retry.retries;
            match build(token).await?.send().await {
                Ok(response) if can_retry && is_retryable(response.status()) => {
                    tracing::warn!(
                        status = %response.status(),
                        attempt = attempt + 1,
                        "Drive request failed, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if can_retry && (e.is_connect() || e.is_timeout()) => {
                    tracing::warn!(error = %e, attempt = attempt + 1, "Drive request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(self.retry.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    /// Query files using Google Drive query syntax, following all pages.
    pub async fn query_files(&self, query: &str) -> Result<Vec<FileMetadata>> {
        let url = format!("{}/files", self.api_base);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            tracing::debug!(query, page_token = ?page_token, "listing files");
            let response = self
                .send_with_retry(|token| {
                    let mut request = self
                        .http
                        .get(&url)
                        .bearer_auth(token)
                        .query(&[
                            ("q", query),
                            ("includeItemsFromAllDrives", "true"),
                            ("supportsAllDrives", "true"),
                            ("spaces", "drive"),
                            ("pageSize", PAGE_SIZE),
                            ("fields", LIST_FIELDS),
                        ]);
                    if let Some(ref page) = page_token {
                        request = request.query(&[("pageToken", page)]);
                    }
                    async move { Ok::<_, DriveError>(request) }
                })
                .await?;

            let list_response: FileListResponse = into_success(response).await?.json().await?;
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    async fn upload_multipart(
        &self,
        local_path: &Path,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<FileMetadata> {
        let url = format!("{}/files", self.upload_base);
        let url = url.as_str();
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id]
        });
        let metadata = &metadata;

        let response = self
            .send_with_retry(|token| async move {
                let file = File::open(local_path).await?;
                let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;
                let file_part =
                    Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), size)
                        .file_name(name.to_string())
                        .mime_str(mime_type)?;
                let form = Form::new()
                    .part("metadata", metadata_part)
                    .part("file", file_part);

                Ok::<_, DriveError>(
                    self.http
                        .post(url)
                        .bearer_auth(token)
                        .query(&[
                            ("uploadType", "multipart"),
                            ("supportsAllDrives", "true"),
                            ("fields", FILE_FIELDS),
                        ])
                        .multipart(form),
                )
            })
            .await?;

        Ok(into_success(response).await?.json().await?)
    }

    async fn upload_media(
        &self,
        local_path: &Path,
        file_id: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<FileMetadata> {
        let url = format!("{}/files/{}", self.upload_base, file_id);
        let url = url.as_str();

        let response = self
            .send_with_retry(|token| async move {
                let file = File::open(local_path).await?;
                Ok::<_, DriveError>(
                    self.http
                        .patch(url)
                        .bearer_auth(token)
                        .query(&[
                            ("uploadType", "media"),
                            ("supportsAllDrives", "true"),
                            ("fields", FILE_FIELDS),
                        ])
                        .header(CONTENT_TYPE, mime_type)
                        .header("Content-Length", size.to_string())
                        .body(Body::wrap_stream(ReaderStream::new(file))),
                )
            })
            .await?;

        Ok(into_success(response).await?.json().await?)
    }

    /// Upload through a resumable session, one chunk at a time.
    async fn upload_resumable(
        &self,
        method: Method,
        url: String,
        metadata: serde_json::Value,
        local_path: &Path,
        mime_type: &str,
        size: u64,
    ) -> Result<FileMetadata> {
        let init_response = self
            .send_with_retry(|token| {
                let request = self
                    .http
                    .request(method.clone(), &url)
                    .bearer_auth(token)
                    .query(&[
                        ("uploadType", "resumable"),
                        ("supportsAllDrives", "true"),
                        ("fields", FILE_FIELDS),
                    ])
                    .header("X-Upload-Content-Type", mime_type)
                    .header("X-Upload-Content-Length", size.to_string())
                    .json(&metadata);
                async move { Ok::<_, DriveError>(request) }
            })
            .await?;
        let init_response = into_success(init_response).await?;

        let session_url = init_response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DriveError::ApiError {
                status: init_response.status().as_u16(),
                message: "No upload URL in response".to_string(),
            })?
            .to_string();

        let mut file = File::open(local_path).await?;
        let mut offset = 0u64;
        let mut stalls = 0u32;

        loop {
            if offset >= size {
                return Err(DriveError::ApiError {
                    status: 308,
                    message: format!(
                        "Upload session for {} reported {} of {} bytes without completing",
                        local_path.display(),
                        offset,
                        size
                    ),
                });
            }
            let len = CHUNK_SIZE.min(size - offset);
            let mut chunk = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;
            let content_range = format!("bytes {}-{}/{}", offset, offset + len - 1, size);

            let response = self
                .send_with_retry(|_token| {
                    let request = self
                        .http
                        .put(&session_url)
                        .header(CONTENT_RANGE, content_range.as_str())
                        .body(chunk.clone());
                    async move { Ok::<_, DriveError>(request) }
                })
                .await?;

            if response.status() == StatusCode::PERMANENT_REDIRECT {
                let received = next_offset(&response);
                if received <= offset {
                    stalls += 1;
                    if stalls > self.retry.retries {
                        return Err(DriveError::ApiError {
                            status: 308,
                            message: format!("Upload of {} stopped making progress", local_path.display()),
                        });
                    }
                } else {
                    stalls = 0;
                }
                offset = received;
                tracing::info!("...Uploaded {}%.", offset * 100 / size);
                continue;
            }

            return Ok(into_success(response).await?.json().await?);
        }
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    fn account_email(&self) -> &str {
        self.auth.account_email()
    }

    async fn list_children(&self, folder_id: &str, filter: ListFilter) -> Result<Vec<FileMetadata>> {
        let query = list_query(folder_id, filter, self.account_email());
        self.query_files(&query).await
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<FileMetadata>> {
        let query = format!(
            "'{}' in parents and name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_value(parent_id),
            escape_query_value(name),
            FOLDER_MIME_TYPE
        );
        let folders = self.query_files(&query).await?;
        Ok(folders.into_iter().next())
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<FileMetadata> {
        let url = format!("{}/files", self.api_base);
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id]
        });

        let response = self
            .send_with_retry(|token| {
                let request = self
                    .http
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
                    .json(&body);
                async move { Ok::<_, DriveError>(request) }
            })
            .await?;

        let folder: FileMetadata = into_success(response).await?.json().await?;
        if folder.id.is_empty() {
            return Err(DriveError::FolderCreationFailed(name.to_string()));
        }
        Ok(folder)
    }

    async fn owners(&self, id: &str) -> Result<Vec<Owner>> {
        let url = format!("{}/files/{}", self.api_base, id);

        let response = self
            .send_with_retry(|token| {
                let request = self
                    .http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("supportsAllDrives", "true"), ("fields", "owners")]);
                async move { Ok::<_, DriveError>(request) }
            })
            .await?;

        let owners: OwnersResponse = into_success(response).await?.json().await?;
        Ok(owners.owners)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = format!("{}/files/{}", self.api_base, id);

        let response = self
            .send_with_retry(|token| {
                let request = self
                    .http
                    .delete(&url)
                    .bearer_auth(token)
                    .query(&[("supportsAllDrives", "true")]);
                async move { Ok::<_, DriveError>(request) }
            })
            .await?;

        // Already gone counts as deleted.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        into_success(response).await?;
        Ok(())
    }

    async fn create_file(
        &self,
        local_path: &Path,
        parent_id: &str,
        name: &str,
    ) -> Result<FileMetadata> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();
        tracing::debug!(path = %local_path.display(), size = %format_size(size), mime = %mime_type, "creating file");

        if size <= SIMPLE_UPLOAD_LIMIT {
            self.upload_multipart(local_path, parent_id, name, &mime_type, size)
                .await
        } else {
            let metadata = serde_json::json!({
                "name": name,
                "parents": [parent_id]
            });
            let url = format!("{}/files", self.upload_base);
            self.upload_resumable(Method::POST, url, metadata, local_path, &mime_type, size)
                .await
        }
    }

    async fn update_file(&self, local_path: &Path, file_id: &str) -> Result<FileMetadata> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();
        tracing::debug!(path = %local_path.display(), size = %format_size(size), mime = %mime_type, "updating file");

        if size <= SIMPLE_UPLOAD_LIMIT {
            self.upload_media(local_path, file_id, &mime_type, size).await
        } else {
            let url = format!("{}/files/{}", self.upload_base, file_id);
            self.upload_resumable(
                Method::PATCH,
                url,
                serde_json::json!({}),
                local_path,
                &mime_type,
                size,
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query_value() {
        assert_eq!(escape_query_value("plain"), "plain");
        assert_eq!(escape_query_value("it's"), "it\\'s");
        assert_eq!(escape_query_value(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_list_query_all() {
        let query = list_query("folder1", ListFilter::All, "ci@example.com");
        assert_eq!(query, "'folder1' in parents and trashed = false");
    }

    #[test]
    fn test_list_query_owned_files() {
        let query = list_query("folder1", ListFilter::OwnedFiles, "ci@example.com");
        assert!(query.contains("'ci@example.com' in owners"));
        assert!(query.contains("mimeType != 'application/vnd.google-apps.folder'"));
    }

    #[test]
    fn test_list_query_owned_folders() {
        let query = list_query("folder1", ListFilter::OwnedFolders, "ci@example.com");
        assert!(query.contains("mimeType = 'application/vnd.google-apps.folder'"));
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(32));
        assert_eq!(policy.delay_for(40), Duration::from_secs(32));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }
}
