//! Local side of the sync: find the files to upload.

use std::path::{Component, Path, PathBuf};

use glob::{glob, Pattern};

use crate::error::{DriveError, Result};

/// Comma separated glob patterns of files to leave out.
///
/// A pattern is matched against the end of a path, one component at a time:
/// `*.log` skips `a/b/c.log`, `build/*.o` skips `x/build/y.o`. A pattern
/// with a leading `/` has to match the whole relative path.
#[derive(Debug, Clone, Default)]
pub struct SkipPatterns {
    patterns: Vec<SkipPattern>,
}

#[derive(Debug, Clone)]
struct SkipPattern {
    source: String,
    anchored: bool,
    components: Vec<Pattern>,
}

impl SkipPatterns {
    /// Parse a comma separated list; blank entries are dropped.
    pub fn parse(csv: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for raw in csv.split(',') {
            let source = raw.trim();
            if source.is_empty() {
                continue;
            }
            let anchored = source.starts_with('/');
            let components = source
                .split('/')
                .filter(|c| !c.is_empty())
                .map(Pattern::new)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if components.is_empty() {
                continue;
            }
            patterns.push(SkipPattern {
                source: source.to_string(),
                anchored,
                components,
            });
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The pattern that skips `path`, if any.
    pub fn matching(&self, path: &Path) -> Option<&str> {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        self.patterns
            .iter()
            .find(|p| p.matches(&parts))
            .map(|p| p.source.as_str())
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.matching(path).is_some()
    }
}

impl SkipPattern {
    fn matches(&self, parts: &[String]) -> bool {
        let n = self.components.len();
        if parts.len() < n || (self.anchored && parts.len() != n) {
            return false;
        }
        parts[parts.len() - n..]
            .iter()
            .zip(&self.components)
            .all(|(part, pattern)| pattern.matches(part))
    }
}

/// Check that every input exists and is a directory.
pub fn validate_inputs(inputs: &[PathBuf]) -> Result<()> {
    for input in inputs {
        if !input.exists() {
            return Err(DriveError::InputNotFound(input.display().to_string()));
        }
        if !input.is_dir() {
            return Err(DriveError::InputNotADirectory(input.display().to_string()));
        }
    }
    Ok(())
}

/// Recursively collect the regular files below `input` whose name matches
/// `filter`, minus the skipped ones.
///
/// Returned paths are relative to `input` and sorted.
pub fn scan_input(input: &Path, filter: &str, skip: &SkipPatterns) -> Result<Vec<PathBuf>> {
    // glob drops a leading "./" from what it yields, so match on a base without it.
    let base: PathBuf = input
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    let pattern = if base.as_os_str().is_empty() {
        format!("**/{}", filter)
    } else {
        format!(
            "{}/**/{}",
            Pattern::escape(&base.to_string_lossy()),
            filter
        )
    };
    tracing::debug!(pattern = %pattern, "scanning");

    let mut files = Vec::new();
    for entry in glob(&pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", e.path().display(), e.error());
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(&base).unwrap_or(&path).to_path_buf();
        if let Some(pattern) = skip.matching(&relative) {
            tracing::info!(
                "Skipping file {} due to skip pattern {}",
                relative.display(),
                pattern
            );
            continue;
        }
        files.push(relative);
    }

    files.sort();
    files.dedup();
    Ok(files)
}
