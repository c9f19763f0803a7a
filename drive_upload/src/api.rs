//! The set of remote operations the sync is built on.
//!
//! [`DriveClient`](crate::client::DriveClient) implements this trait against
//! the Drive v3 REST API; tests plug in an in-memory implementation.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FileMetadata, Owner};

/// Which children of a folder to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    /// Every child regardless of owner or type.
    All,
    /// Non-folder children owned by the service account.
    OwnedFiles,
    /// Folder children owned by the service account.
    OwnedFolders,
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Email of the account the API acts as.
    fn account_email(&self) -> &str;

    /// List the (non-trashed) children of a folder.
    async fn list_children(&self, folder_id: &str, filter: ListFilter) -> Result<Vec<FileMetadata>>;

    /// Find a child folder by exact name. When several match, the first one
    /// returned by the API is used.
    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<FileMetadata>>;

    /// Create a folder below `parent_id`.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<FileMetadata>;

    /// Owners of a file or folder.
    async fn owners(&self, id: &str) -> Result<Vec<Owner>>;

    /// Permanently delete a file or folder.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Upload `local_path` as a new file called `name` below `parent_id`.
    async fn create_file(&self, local_path: &Path, parent_id: &str, name: &str)
        -> Result<FileMetadata>;

    /// Replace the content of an existing file.
    async fn update_file(&self, local_path: &Path, file_id: &str) -> Result<FileMetadata>;
}
