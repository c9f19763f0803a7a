//! In-memory Drive used by the sync tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use drive_upload::api::{DriveApi, ListFilter};
use drive_upload::error::{DriveError, Result};
use drive_upload::models::{FileMetadata, Owner, FOLDER_MIME_TYPE};

pub const SERVICE_EMAIL: &str = "ci@project.iam.gserviceaccount.com";
pub const HUMAN_EMAIL: &str = "someone@example.com";
pub const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<String>,
    pub folder: bool,
    pub owner: String,
    pub content: Vec<u8>,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    next_id: u64,
    // Ids whose deletion is refused with a 403.
    locked: BTreeSet<String>,
}

impl State {
    fn insert(&mut self, node: Node) -> String {
        self.next_id += 1;
        let id = format!("id-{:06}", self.next_id);
        self.nodes.insert(id.clone(), node);
        id
    }
}

/// A Drive with a single root folder owned by a human user.
pub struct FakeDrive {
    email: String,
    state: Mutex<State>,
}

impl FakeDrive {
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(
            ROOT_ID.to_string(),
            Node {
                name: "root".to_string(),
                parent: None,
                folder: true,
                owner: HUMAN_EMAIL.to_string(),
                content: Vec::new(),
            },
        );
        Self {
            email: SERVICE_EMAIL.to_string(),
            state: Mutex::new(state),
        }
    }

    pub fn add_folder(&self, parent: &str, name: &str, owner: &str) -> String {
        self.state.lock().unwrap().insert(Node {
            name: name.to_string(),
            parent: Some(parent.to_string()),
            folder: true,
            owner: owner.to_string(),
            content: Vec::new(),
        })
    }

    pub fn add_file(&self, parent: &str, name: &str, owner: &str, content: &str) -> String {
        self.state.lock().unwrap().insert(Node {
            name: name.to_string(),
            parent: Some(parent.to_string()),
            folder: false,
            owner: owner.to_string(),
            content: content.as_bytes().to_vec(),
        })
    }

    /// Make every later `delete` of `id` fail with a 403.
    pub fn refuse_delete(&self, id: &str) {
        self.state.lock().unwrap().locked.insert(id.to_string());
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.state.lock().unwrap().nodes.get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    /// Resolve a `/` separated path of names below `root`.
    pub fn find(&self, root: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let mut current = root.to_string();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = state
                .nodes
                .iter()
                .find(|(_, n)| n.parent.as_deref() == Some(current.as_str()) && n.name == part)
                .map(|(id, _)| id.clone())?;
        }
        Some(current)
    }

    /// Every file below `root`, by relative path, with its content.
    pub fn files_below(&self, root: &str) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        let mut files = BTreeMap::new();
        collect(&state, root, "", &mut files);
        files
    }

    /// Number of children of `parent` called `name`.
    pub fn count_named(&self, parent: &str, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .values()
            .filter(|n| n.parent.as_deref() == Some(parent) && n.name == name)
            .count()
    }
}

fn collect(state: &State, folder: &str, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (id, node) in &state.nodes {
        if node.parent.as_deref() != Some(folder) {
            continue;
        }
        let path = if prefix.is_empty() {
            node.name.clone()
        } else {
            format!("{}/{}", prefix, node.name)
        };
        if node.folder {
            collect(state, id, &path, out);
        } else {
            out.insert(path, String::from_utf8_lossy(&node.content).into_owned());
        }
    }
}

fn metadata(id: &str, node: &Node) -> FileMetadata {
    FileMetadata {
        id: id.to_string(),
        name: node.name.clone(),
        mime_type: Some(if node.folder {
            FOLDER_MIME_TYPE.to_string()
        } else {
            "text/plain".to_string()
        }),
        size: Some(node.content.len() as u64),
    }
}

fn not_found(id: &str) -> DriveError {
    DriveError::ApiError {
        status: 404,
        message: format!("File not found: {}", id),
    }
}

#[async_trait]
impl DriveApi for FakeDrive {
    fn account_email(&self) -> &str {
        &self.email
    }

    async fn list_children(&self, folder_id: &str, filter: ListFilter) -> Result<Vec<FileMetadata>> {
        let state = self.state.lock().unwrap();
        if !state.nodes.contains_key(folder_id) {
            return Err(not_found(folder_id));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.as_deref() == Some(folder_id))
            .filter(|(_, n)| match filter {
                ListFilter::All => true,
                ListFilter::OwnedFiles => n.owner == self.email && !n.folder,
                ListFilter::OwnedFolders => n.owner == self.email && n.folder,
            })
            .map(|(id, n)| metadata(id, n))
            .collect())
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<FileMetadata>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .find(|(_, n)| n.folder && n.parent.as_deref() == Some(parent_id) && n.name == name)
            .map(|(id, n)| metadata(id, n)))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<FileMetadata> {
        let id = self.add_folder(parent_id, name, SERVICE_EMAIL);
        let node = self.node(&id).ok_or_else(|| not_found(&id))?;
        Ok(metadata(&id, &node))
    }

    async fn owners(&self, id: &str) -> Result<Vec<Owner>> {
        let node = self.node(id).ok_or_else(|| not_found(id))?;
        Ok(vec![Owner {
            email_address: Some(node.owner),
        }])
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.locked.contains(id) {
            return Err(DriveError::ApiError {
                status: 403,
                message: format!("Insufficient permissions for file {}", id),
            });
        }
        let mut doomed = vec![id.to_string()];
        while let Some(current) = doomed.pop() {
            state.nodes.remove(&current);
            doomed.extend(
                state
                    .nodes
                    .iter()
                    .filter(|(_, n)| n.parent.as_deref() == Some(current.as_str()))
                    .map(|(id, _)| id.clone()),
            );
        }
        Ok(())
    }

    async fn create_file(&self, local_path: &Path, parent_id: &str, name: &str) -> Result<FileMetadata> {
        let content = fs::read(local_path)?;
        let id = self.state.lock().unwrap().insert(Node {
            name: name.to_string(),
            parent: Some(parent_id.to_string()),
            folder: false,
            owner: SERVICE_EMAIL.to_string(),
            content,
        });
        let node = self.node(&id).ok_or_else(|| not_found(&id))?;
        Ok(metadata(&id, &node))
    }

    async fn update_file(&self, local_path: &Path, file_id: &str) -> Result<FileMetadata> {
        let content = fs::read(local_path)?;
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(file_id).ok_or_else(|| not_found(file_id))?;
        node.content = content;
        Ok(metadata(file_id, node))
    }
}
