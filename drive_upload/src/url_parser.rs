//! Resolve the `--target` argument to a Drive ID.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{DriveError, Result};

/// Folder URLs (with or without the `/u/<n>/` account segment), file URLs
/// and `open?id=` links.
static URL_REGEXES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)")
            .expect("Invalid folder URL regex"),
        Regex::new(r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)")
            .expect("Invalid file URL regex"),
        Regex::new(r"^https?://drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)")
            .expect("Invalid open URL regex"),
    ]
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Extract the ID from a Drive folder, file or `open?id=` URL, or validate
/// a raw ID.
///
/// ```
/// use drive_upload::url_parser::extract_id;
///
/// let id = extract_id("https://drive.google.com/drive/folders/1abc123").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = extract_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn extract_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    for regex in URL_REGEXES.iter() {
        if let Some(id) = regex.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(id.as_str().to_string());
        }
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidUrlOrId(url_or_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_folder_url_with_user() {
        let url = "https://drive.google.com/drive/u/2/folders/1abc123XYZ";
        assert_eq!(extract_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn test_extract_file_url() {
        let url = "https://drive.google.com/file/d/1abc123XYZ/view";
        assert_eq!(extract_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn test_blank_is_rejected() {
        assert!(extract_id("").is_err());
        assert!(extract_id("   ").is_err());
    }
}
