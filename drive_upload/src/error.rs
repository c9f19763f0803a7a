//! Error types for the drive_upload crate.

use thiserror::Error;

/// Errors that can occur while syncing files to Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Failed to read credentials file: {0}")]
    CredentialsFileError(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credentials JSON: {0}")]
    CredentialsParseError(#[from] serde_json::Error),

    #[error("Failed to decode base64 credentials: {0}")]
    CredentialsDecodeError(#[from] base64::DecodeError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("Input folder {0} does not exist")]
    InputNotFound(String),

    #[error("Input folder {0} is not a directory")]
    InputNotADirectory(String),

    #[error("Output path {0} must not contain '..'")]
    InvalidOutputPath(String),

    #[error("Glob pattern error: {0}")]
    GlobPatternError(#[from] glob::PatternError),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("Could not create folder {0}")]
    FolderCreationFailed(String),
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
