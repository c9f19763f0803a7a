//! One-shot sync of local folders into a Drive folder.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::api::DriveApi;
use crate::error::Result;
use crate::models::{DirInfo, FileInfo, UploadInfo, UploadTarget};
use crate::remote;
use crate::scan::{self, SkipPatterns};

/// What to sync and where to.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Local folders whose content is uploaded.
    pub inputs: Vec<PathBuf>,
    /// Glob applied to file names at every depth.
    pub filter: String,
    /// Folder path below the target folder to upload into.
    pub output: PathBuf,
    /// Drive ID of the root folder.
    pub target_id: String,
    /// Put every file directly in the output folder.
    pub flat_upload: bool,
    /// Delete remote files that have no local counterpart.
    pub purge_stale: bool,
    pub skip: SkipPatterns,
}

/// Counts of what a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub folders_removed: usize,
}

/// Build the upload targets for one input folder, creating remote folders
/// as needed when the structure is preserved.
pub async fn upload_targets(
    api: &dyn DriveApi,
    input: &Path,
    options: &SyncOptions,
    output: &DirInfo,
) -> Result<Vec<UploadTarget>> {
    let files = scan::scan_input(input, &options.filter, &options.skip)?;
    // Folders already ensured for this input, by relative directory.
    let mut folders: HashMap<PathBuf, DirInfo> = HashMap::new();
    let mut targets = Vec::with_capacity(files.len());

    for relative in files {
        let local_path = input.join(&relative);
        let target = if options.flat_upload {
            let name = relative.file_name().map(PathBuf::from).unwrap_or_default();
            UploadTarget {
                local_path,
                remote_path: name,
                folder: output.clone(),
            }
        } else {
            let parent = relative.parent().map(PathBuf::from).unwrap_or_default();
            let folder = match folders.get(&parent) {
                Some(folder) => folder.clone(),
                None => {
                    let folder = remote::ensure_path(api, &parent, output).await?;
                    folders.insert(parent, folder.clone());
                    folder
                }
            };
            UploadTarget {
                local_path,
                remote_path: relative,
                folder,
            }
        };
        targets.push(target);
    }

    Ok(targets)
}

/// Run the whole sync against `api`.
pub async fn run(api: &dyn DriveApi, options: &SyncOptions) -> Result<SyncReport> {
    scan::validate_inputs(&options.inputs)?;

    let base = DirInfo::new("", options.target_id.clone());
    let output = remote::ensure_path(api, &options.output, &base).await?;
    // Remote paths are relative to the output folder from here on.
    let output = DirInfo::new("", output.id);

    let mut by_remote_path: BTreeMap<PathBuf, UploadTarget> = BTreeMap::new();
    for input in &options.inputs {
        tracing::info!("==== Scanning local files in: {} ====", input.display());
        for target in upload_targets(api, input, options, &output).await? {
            if let Some(previous) = by_remote_path.insert(target.remote_path.clone(), target) {
                tracing::warn!(
                    "{} is replaced by a later file with the same remote path",
                    previous.local_path.display()
                );
            }
        }
    }
    let targets: Vec<UploadTarget> = by_remote_path.into_values().collect();

    tracing::info!("==== Local Files to Upload ====");
    for target in &targets {
        tracing::info!(
            "{} will be uploaded to folder {} ({})",
            target.local_path.display(),
            target.folder.id,
            target.folder.display_path()
        );
    }

    let remote_tree = remote::fetch_remote_folder_tree(api, &output).await?;

    // Remote folders win over the ones recorded while scanning.
    let mut folders: BTreeMap<String, DirInfo> = targets
        .iter()
        .map(|t| (t.folder.id.clone(), t.folder.clone()))
        .collect();
    for dir in remote::tree_to_list(&remote_tree) {
        folders.insert(dir.id.clone(), dir);
    }

    tracing::info!("==== Considering the following remote folders ====");
    for (id, folder) in &folders {
        tracing::info!("{} ({})", folder.display_path(), id);
    }

    let mut remote_files: Vec<FileInfo> = Vec::new();
    for folder in folders.values() {
        remote_files.extend(remote::list_files_in_folder(api, folder).await?);
    }

    tracing::info!("==== Remote Files ====");
    for file in &remote_files {
        tracing::info!("{} ({})", file.path.display(), file.id);
    }

    tracing::info!("==== Uploading Files ====");
    let remote_by_path: HashMap<&PathBuf, &FileInfo> =
        remote_files.iter().map(|f| (&f.path, f)).collect();

    let mut report = SyncReport::default();
    for target in &targets {
        let existing = remote_by_path.get(&target.remote_path).map(|f| (*f).clone());
        let info = UploadInfo {
            target: target.clone(),
            existing,
        };
        remote::upload_file(api, &info).await?;
        if info.existing.is_some() {
            report.updated += 1;
        } else {
            report.created += 1;
        }
    }

    if options.purge_stale {
        tracing::info!("==== Removing Stale Remote Files ====");
        let local_paths: HashSet<&PathBuf> = targets.iter().map(|t| &t.remote_path).collect();
        let stale: Vec<FileInfo> = remote_files
            .iter()
            .filter(|f| !local_paths.contains(&f.path))
            .cloned()
            .collect();
        report.deleted = remote::batch_delete(api, &stale).await;

        tracing::info!("==== Cleaning Up Empty Folders ====");
        report.folders_removed = remote::cleanup_folders(api, &remote_tree).await?;
    }

    tracing::info!(
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        folders_removed = report.folders_removed,
        "sync finished"
    );
    Ok(report)
}
