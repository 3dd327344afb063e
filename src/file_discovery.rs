use crate::error::{Result, ValidationError};
use globset::{GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Include pattern used when none is configured
pub const DEFAULT_INCLUDE: &str = "**/*.xml";

/// Async enumeration of the target documents of a run
///
/// Include and exclude patterns are matched against paths relative to the base
/// directory; results are absolute and sorted.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    include_patterns: Vec<String>,
    include_set: GlobSet,
    /// Exclude patterns set
    exclude_set: Option<GlobSet>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        let include_patterns = vec![DEFAULT_INCLUDE.to_string()];
        let include_set = build_glob_set(&include_patterns, "include")
            .unwrap_or_else(|_| GlobSet::empty());
        Self {
            include_patterns,
            include_set,
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Replace the include patterns; an empty list keeps the default
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(self);
        }
        self.include_set = build_glob_set(&patterns, "include")?;
        self.include_patterns = patterns;
        Ok(self)
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        if patterns.is_empty() {
            self.exclude_set = None;
            return Ok(self);
        }
        self.exclude_set = Some(build_glob_set(&patterns, "exclude")?);
        Ok(self)
    }

    /// Set maximum traversal depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include_patterns
    }

    /// Discover target files below `base`
    pub async fn discover_files(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(base).await.map_err(ValidationError::from)?;
        if !metadata.is_dir() {
            return Err(ValidationError::FileSystemTraversal {
                path: base.to_path_buf(),
                reason: "base is not a directory".to_string(),
            });
        }
        let base = fs::canonicalize(base).await.map_err(|e| {
            ValidationError::FileSystemTraversal {
                path: base.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let mut files = Vec::new();
        let mut read_dir = fs::read_dir(&base).await.map_err(ValidationError::from)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(ValidationError::from)? {
            let entry_path = entry.path();

            if entry_path.is_symlink() && !self.follow_symlinks {
                continue;
            }

            if let Err(e) = self
                .discover_files_recursive(&base, &entry_path, 0, &mut files)
                .await
            {
                warn!("skipping {}: {}", entry_path.display(), e);
            }
        }

        files.sort();
        debug!("{} target file(s) under {}", files.len(), base.display());
        Ok(files)
    }

    fn discover_files_recursive<'a>(
        &'a self,
        base: &'a Path,
        path: &'a Path,
        depth: usize,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            if let Some(max_depth) = self.max_depth
                && depth > max_depth
            {
                return Ok(());
            }

            let metadata = fs::metadata(path).await.map_err(ValidationError::from)?;

            if metadata.is_file() {
                if self.should_process(base, path) {
                    files.push(path.to_path_buf());
                }
            } else if metadata.is_dir() {
                if let Some(max_depth) = self.max_depth
                    && depth >= max_depth
                {
                    return Ok(());
                }

                let mut read_dir = fs::read_dir(path).await.map_err(ValidationError::from)?;

                while let Some(entry) =
                    read_dir.next_entry().await.map_err(ValidationError::from)?
                {
                    let entry_path = entry.path();

                    if entry_path.is_symlink() && !self.follow_symlinks {
                        continue;
                    }

                    if let Err(e) = self
                        .discover_files_recursive(base, &entry_path, depth + 1, files)
                        .await
                    {
                        warn!("skipping {}: {}", entry_path.display(), e);
                    }
                }
            }

            Ok(())
        })
    }

    /// Whether `path` (below `base`) is selected by the include/exclude patterns
    pub fn should_process(&self, base: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(base).unwrap_or(path);

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(relative)
        {
            debug!("{} excluded", relative.display());
            return false;
        }

        self.include_set.is_match(relative)
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn build_glob_set(patterns: &[String], kind: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                ValidationError::Config(format!("Invalid glob pattern '{}': {}", pattern, e))
            })?;
        builder.add(glob);
    }

    builder
        .build()
        .map_err(|e| ValidationError::Config(format!("Failed to build {} glob set: {}", kind, e)))
}
