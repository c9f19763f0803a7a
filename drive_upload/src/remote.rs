//! Folder and file operations on the remote side, built on [`DriveApi`].

use std::future::Future;
use std::path::{Component, Path};
use std::pin::Pin;

use crate::api::{DriveApi, ListFilter};
use crate::error::{DriveError, Result};
use crate::models::{format_size, DirInfo, FileInfo, FileMetadata, FolderTree, UploadInfo};

/// Service-account owned files directly inside `folder`.
pub async fn list_files_in_folder(api: &dyn DriveApi, folder: &DirInfo) -> Result<Vec<FileInfo>> {
    let files = api.list_children(&folder.id, ListFilter::OwnedFiles).await?;
    Ok(files
        .into_iter()
        .map(|f| FileInfo {
            path: folder.path.join(&f.name),
            id: f.id,
            parent_id: folder.id.clone(),
        })
        .collect())
}

/// Service-account owned folders directly inside `folder`.
pub async fn list_folders_in_folder(api: &dyn DriveApi, folder: &DirInfo) -> Result<Vec<DirInfo>> {
    let folders = api.list_children(&folder.id, ListFilter::OwnedFolders).await?;
    Ok(folders
        .into_iter()
        .map(|f| DirInfo::new(folder.path.join(&f.name), f.id))
        .collect())
}

/// True when the folder has no children at all, whoever owns them.
pub async fn is_folder_empty(api: &dyn DriveApi, folder: &DirInfo) -> Result<bool> {
    Ok(api.list_children(&folder.id, ListFilter::All).await?.is_empty())
}

/// True when the service account is the one and only owner of `id`.
pub async fn is_owned_by_service(api: &dyn DriveApi, id: &str) -> Result<bool> {
    let owners = api.owners(id).await?;
    Ok(owners.len() == 1 && owners[0].email_address.as_deref() == Some(api.account_email()))
}

/// Make sure `path` exists below `base`, creating missing folders.
///
/// Each component reuses the first folder with that exact name; the returned
/// `DirInfo` has `base.path / path` as its path. A `..` component is
/// rejected before any folder is looked up.
pub async fn ensure_path(api: &dyn DriveApi, path: &Path, base: &DirInfo) -> Result<DirInfo> {
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(DriveError::InvalidOutputPath(path.display().to_string()));
    }

    let mut current = base.clone();

    for component in path.components() {
        let part = match component {
            Component::Normal(part) => part.to_string_lossy().into_owned(),
            // "." and a leading "/" do not name a folder
            _ => continue,
        };

        current = match api.find_folder(&current.id, &part).await? {
            Some(folder) => DirInfo::new(current.path.join(&part), folder.id),
            None => {
                tracing::info!(
                    "Folder {} of path {} does not exist in drive. Creating it.",
                    part,
                    path.display()
                );
                let folder = api.create_folder(&current.id, &part).await?;
                DirInfo::new(current.path.join(&part), folder.id)
            }
        };
    }

    Ok(current)
}

/// Fetch the tree of service-account owned folders below `root`.
///
/// When two sibling folders share a name, the first one listed wins and the
/// other is left out of the tree.
pub async fn fetch_remote_folder_tree(api: &dyn DriveApi, root: &DirInfo) -> Result<FolderTree> {
    let mut tree = FolderTree::leaf(root.clone());
    build_tree(api, &mut tree).await?;
    Ok(tree)
}

fn build_tree<'a>(
    api: &'a dyn DriveApi,
    node: &'a mut FolderTree,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        for folder in list_folders_in_folder(api, &node.dir).await? {
            let name = match folder.path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            if node.children.contains_key(&name) {
                tracing::warn!(
                    "Ignoring duplicate remote folder {} ({})",
                    folder.path.display(),
                    folder.id
                );
                continue;
            }
            node.children.insert(name, FolderTree::leaf(folder));
        }
        for child in node.children.values_mut() {
            build_tree(api, child).await?;
        }
        Ok(())
    })
}

/// Flatten a tree into its folders, root first.
pub fn tree_to_list(tree: &FolderTree) -> Vec<DirInfo> {
    let mut result = vec![tree.dir.clone()];
    for child in tree.children.values() {
        result.extend(tree_to_list(child));
    }
    result
}

/// Delete every file, logging failures instead of aborting.
///
/// Returns how many deletions succeeded.
pub async fn batch_delete(api: &dyn DriveApi, files: &[FileInfo]) -> usize {
    if files.is_empty() {
        return 0;
    }

    let mut deleted = 0;
    for file in files {
        tracing::info!("Deleting stale file {} ({})", file.path.display(), file.id);
        match api.delete(&file.id).await {
            Ok(()) => deleted += 1,
            Err(e) => tracing::warn!("An error occurred deleting {}: {}", file.path.display(), e),
        }
    }
    tracing::info!("    ==> Done deleting {} files.", deleted);
    deleted
}

/// Remove empty, service-account owned folders below the root of `tree`,
/// deepest first. The root folder itself is kept.
///
/// Returns the number of folders removed.
pub async fn cleanup_folders(api: &dyn DriveApi, tree: &FolderTree) -> Result<usize> {
    let mut order = Vec::new();
    for child in tree.children.values() {
        post_order(child, &mut order);
    }

    let mut removed = 0;
    for dir in order {
        if is_folder_empty(api, dir).await? && is_owned_by_service(api, &dir.id).await? {
            tracing::info!("Deleting empty folder {} ({})", dir.display_path(), dir.id);
            api.delete(&dir.id).await?;
            tracing::info!("    ==> Done");
            removed += 1;
        }
    }
    Ok(removed)
}

fn post_order<'a>(tree: &'a FolderTree, out: &mut Vec<&'a DirInfo>) {
    for child in tree.children.values() {
        post_order(child, out);
    }
    out.push(&tree.dir);
}

/// Upload one file, replacing the existing remote file when there is one.
pub async fn upload_file(api: &dyn DriveApi, info: &UploadInfo) -> Result<FileMetadata> {
    let target = &info.target;
    let name = target.file_name();

    let metadata = match &info.existing {
        Some(existing) => {
            tracing::info!("Updating existing file {}", target.remote_path.display());
            api.update_file(&target.local_path, &existing.id).await?
        }
        None => {
            tracing::info!(
                "Uploading new file {} to folder {}",
                name,
                target.folder.display_path()
            );
            api.create_file(&target.local_path, &target.folder.id, &name)
                .await?
        }
    };

    match metadata.size {
        Some(size) => tracing::info!("    ==> Upload of {} complete ({}).", name, format_size(size)),
        None => tracing::info!("    ==> Upload of {} complete.", name),
    }
    Ok(metadata)
}
