use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use super::LocalRepository;

/// Version-control metadata entries never handed to analyzers.
const VCS_METADATA: &[&str] = &[".git", ".hg", ".svn"];

/// A regular file found in a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    /// Lowercased extension without the leading dot; empty when the file has none.
    pub extension: String,
}

impl FileDescriptor {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            path,
            relative_path,
            extension,
        }
    }

    /// Repository-relative path with `/` separators, used to label findings.
    pub fn display_name(&self) -> String {
        self.relative_path
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Lazily walk a checkout, yielding one descriptor per regular file.
pub fn enumerate(repo: &LocalRepository) -> impl Iterator<Item = FileDescriptor> + Send {
    enumerate_files(repo.root())
}

/// Walk `root` without following symlinks, skipping VCS metadata and unreadable entries.
pub fn enumerate_files(root: &Path) -> impl Iterator<Item = FileDescriptor> + Send {
    let root = root.to_path_buf();
    WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_vcs_metadata(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unknown path".to_string());
                warn!(%path, error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(move |entry| FileDescriptor::new(&root, entry.into_path()))
}

fn is_vcs_metadata(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| VCS_METADATA.contains(&name))
}
