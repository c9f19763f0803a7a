//! Data models for Google Drive API responses and the sync plan.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Metadata for a file or folder in Google Drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
}

impl FileMetadata {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Owner entry of a file, as returned with `fields=owners`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default)]
    pub email_address: Option<String>,
}

/// Response from files.get with `fields=owners`.
#[derive(Debug, Deserialize)]
pub struct OwnersResponse {
    #[serde(default)]
    pub owners: Vec<Owner>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

/// A remote folder. `path` is relative to the output folder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirInfo {
    pub path: PathBuf,
    pub id: String,
}

impl DirInfo {
    pub fn new(path: impl Into<PathBuf>, id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            id: id.into(),
        }
    }

    /// Display form of the path; the output folder itself shows as `/`.
    pub fn display_path(&self) -> String {
        if self.path.as_os_str().is_empty() {
            "/".to_string()
        } else {
            self.path.display().to_string()
        }
    }
}

/// A remote file. `path` is relative to the output folder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileInfo {
    pub path: PathBuf,
    pub id: String,
    pub parent_id: String,
}

/// A local file and the remote folder it goes to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UploadTarget {
    /// Path of the file on the local filesystem.
    pub local_path: PathBuf,
    /// Destination path relative to the output folder.
    pub remote_path: PathBuf,
    pub folder: DirInfo,
}

impl UploadTarget {
    /// Name the file gets on Drive.
    pub fn file_name(&self) -> String {
        self.remote_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An upload target together with the remote file it replaces, if any.
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub target: UploadTarget,
    pub existing: Option<FileInfo>,
}

/// Remote folder hierarchy, keyed by folder name.
#[derive(Debug, Clone)]
pub struct FolderTree {
    pub dir: DirInfo,
    pub children: BTreeMap<String, FolderTree>,
}

impl FolderTree {
    pub fn leaf(dir: DirInfo) -> Self {
        Self {
            dir,
            children: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_file_metadata_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "test.txt",
            "mimeType": "text/plain",
            "size": "1024"
        }"#;

        let metadata: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.id, "abc123");
        assert_eq!(metadata.name, "test.txt");
        assert_eq!(metadata.size, Some(1024));
        assert!(!metadata.is_folder());
    }

    #[test]
    fn test_folder_detection() {
        let json = r#"{"id": "f1", "name": "docs", "mimeType": "application/vnd.google-apps.folder"}"#;
        let metadata: FileMetadata = serde_json::from_str(json).unwrap();
        assert!(metadata.is_folder());
    }

    #[test]
    fn test_owners_response() {
        let json = r#"{"owners": [{"emailAddress": "ci@example.com", "displayName": "CI"}]}"#;
        let response: OwnersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.owners.len(), 1);
        assert_eq!(
            response.owners[0].email_address.as_deref(),
            Some("ci@example.com")
        );
    }

    #[test]
    fn test_root_display_path() {
        assert_eq!(DirInfo::new("", "root").display_path(), "/");
        assert_eq!(DirInfo::new("a/b", "x").display_path(), "a/b");
    }

    #[test]
    fn test_upload_target_file_name() {
        let target = UploadTarget {
            local_path: PathBuf::from("/tmp/in/docs/readme.md"),
            remote_path: PathBuf::from("docs/readme.md"),
            folder: DirInfo::new("docs", "d1"),
        };
        assert_eq!(target.file_name(), "readme.md");
    }
}
