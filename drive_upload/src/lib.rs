//! drive_upload - Upload local folders to a Google Drive folder from CI.
//!
//! This library provides functionality to:
//! - Authenticate as a service account (JSON file or base64 encoded JSON)
//! - Mirror one or more local folders below a Drive folder, optionally flattened
//! - Filter and skip files with glob patterns
//! - Purge remote files that no longer exist locally
//!
//! # Example
//!
//! ```no_run
//! use drive_upload::{sync, Authenticator, DriveClient, SkipPatterns, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_arg("service-account.json")?;
//!     let client = DriveClient::new(auth);
//!
//!     let options = SyncOptions {
//!         inputs: vec!["dist".into()],
//!         filter: "*".to_string(),
//!         output: "releases/nightly".into(),
//!         target_id: "folder-id".to_string(),
//!         flat_upload: false,
//!         purge_stale: true,
//!         skip: SkipPatterns::parse("*.tmp")?,
//!     };
//!     let report = sync::run(&client, &options).await?;
//!     println!("{:?}", report);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod remote;
pub mod scan;
pub mod sync;
pub mod url_parser;

// Re-exports for convenience
pub use api::{DriveApi, ListFilter};
pub use auth::Authenticator;
pub use client::{DriveClient, RetryPolicy};
pub use error::{DriveError, Result};
pub use scan::SkipPatterns;
pub use sync::{SyncOptions, SyncReport};
pub use url_parser::extract_id;
