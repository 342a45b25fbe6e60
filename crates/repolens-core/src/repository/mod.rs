use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};
use url::Url;
use walkdir::WalkDir;

pub mod enumerate;
pub mod git_cloner;

static SCP_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9._-]+:(?P<path>[^:]+)$").expect("static regex is valid")
});

/// Remote repository locator plus the short name derived from its last path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRef {
    remote: String,
    name: String,
}

impl RepositoryRef {
    /// Validate a locator and derive its short name (`.git` suffix stripped).
    pub fn parse(remote: impl Into<String>) -> Result<Self, AcquisitionError> {
        let remote = remote.into().trim().to_string();
        if remote.is_empty() {
            return Err(AcquisitionError::invalid(remote, "identifier is empty"));
        }
        if remote.chars().any(char::is_whitespace) {
            return Err(AcquisitionError::invalid(
                remote,
                "identifier must not contain whitespace",
            ));
        }
        let Some(name) = short_name(&remote) else {
            return Err(AcquisitionError::invalid(
                remote,
                "could not derive a repository name from the last path segment",
            ));
        };
        Ok(Self { remote, name })
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/repo` path on the hosting service, when the locator names a remote host.
    pub fn owner_repo(&self) -> Option<String> {
        let path = match Url::parse(&self.remote) {
            Ok(url) if url.host_str().is_some_and(|host| !host.is_empty()) => {
                url.path().to_string()
            }
            Ok(_) => return None,
            Err(_) => SCP_LIKE
                .captures(&self.remote)
                .map(|caps| caps["path"].to_string())?,
        };
        let segments: Vec<_> = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        match segments.as_slice() {
            [.., owner, repo] => Some(format!("{owner}/{}", strip_git_suffix(repo))),
            _ => None,
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote)
    }
}

fn strip_git_suffix(segment: &str) -> &str {
    segment.strip_suffix(".git").unwrap_or(segment)
}

fn short_name(remote: &str) -> Option<String> {
    let trimmed = remote.trim_end_matches('/');
    let last = trimmed
        .rsplit(|c: char| c == '/' || c == ':' || c == '\\')
        .next()
        .unwrap_or(trimmed);
    let name = strip_git_suffix(last);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Fatal failures that prevent a repository from being acquired.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid repository identifier `{remote}`: {reason}")]
    InvalidIdentifier { remote: String, reason: String },
    #[error("checkout location {} is not usable: {source}", path.display())]
    Workdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to clone `{remote}`: {detail}")]
    Clone { remote: String, detail: String },
}

impl AcquisitionError {
    fn invalid(remote: String, reason: &str) -> Self {
        Self::InvalidIdentifier {
            remote,
            reason: reason.to_string(),
        }
    }

    fn workdir(path: &Path, source: io::Error) -> Self {
        Self::Workdir {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Materializes a full working copy of a remote repository at a local path.
#[async_trait]
pub trait RepositoryCloner: Send + Sync {
    async fn fetch_into(&self, remote: &str, dest: &Path) -> Result<(), AcquisitionError>;
}

/// Checkout owned by a single pipeline run.
///
/// Holds the per-path lease for as long as it lives. Unless the acquirer keeps
/// checkouts, the tree is removed by [`LocalRepository::release`], or on drop
/// when the owner never released it.
pub struct LocalRepository {
    root: PathBuf,
    remove_on_drop: bool,
    _lease: Lease,
}

impl LocalRepository {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove the checkout off the executor thread, then give up the lease.
    pub async fn release(mut self) {
        if !self.remove_on_drop {
            return;
        }
        self.remove_on_drop = false;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(path = %self.root.display(), "checkout removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.root.display(), error = %err, "failed to remove checkout"),
        }
    }
}

impl fmt::Debug for LocalRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRepository")
            .field("root", &self.root)
            .field("remove_on_drop", &self.remove_on_drop)
            .finish()
    }
}

impl Drop for LocalRepository {
    // Fallback for runs that end early (cancellation, errors, panics). The removal
    // blocks the dropping thread; the lease is released only afterwards.
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "checkout removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.root.display(), error = %err, "failed to remove checkout"),
        }
    }
}

type LeaseTable = Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>;

/// Exclusive hold on one checkout path. Drops its table entry once nobody else wants it.
struct Lease {
    table: Arc<LeaseTable>,
    key: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.guard.take();
        let mut leases = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if leases
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            leases.remove(&self.key);
        }
    }
}

/// Acquisition adapter: serializes remove-then-clone per checkout path.
pub struct Acquirer {
    cloner: Arc<dyn RepositoryCloner>,
    keep_checkouts: bool,
    leases: Arc<LeaseTable>,
}

impl Acquirer {
    pub fn new(cloner: Arc<dyn RepositoryCloner>) -> Self {
        Self {
            cloner,
            keep_checkouts: false,
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Leave checkouts on disk after the owning run finishes.
    pub fn keep_checkouts(mut self, keep: bool) -> Self {
        self.keep_checkouts = keep;
        self
    }

    /// Clone `repo` under `root_dir`, replacing any stale tree at the target path.
    #[instrument(name = "acquire", skip(self, repo, root_dir), fields(remote = %repo.remote()))]
    pub async fn acquire(
        &self,
        repo: &RepositoryRef,
        root_dir: &Path,
    ) -> Result<LocalRepository, AcquisitionError> {
        tokio::fs::create_dir_all(root_dir)
            .await
            .map_err(|err| AcquisitionError::workdir(root_dir, err))?;
        let root_dir = tokio::fs::canonicalize(root_dir)
            .await
            .map_err(|err| AcquisitionError::workdir(root_dir, err))?;
        let target = root_dir.join(repo.name());

        let lease = self.lease(&target).await;
        remove_stale(&target).await?;

        // Constructed before cloning so a partial tree from a failed clone is removed.
        let local = LocalRepository {
            root: target.clone(),
            remove_on_drop: !self.keep_checkouts,
            _lease: lease,
        };
        self.cloner.fetch_into(repo.remote(), &target).await?;

        let walk_root = target.clone();
        match tokio::task::spawn_blocking(move || normalize_permissions(&walk_root)).await {
            Ok(adjusted) => debug!(adjusted, "permissions normalized"),
            Err(err) => warn!(error = %err, "permission normalization task failed"),
        }
        Ok(local)
    }

    async fn lease(&self, target: &Path) -> Lease {
        let lock = {
            let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(leases.entry(target.to_path_buf()).or_default())
        };
        let guard = lock.lock_owned().await;
        Lease {
            table: Arc::clone(&self.leases),
            key: target.to_path_buf(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_paths(&self) -> usize {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn remove_stale(target: &Path) -> Result<(), AcquisitionError> {
    let meta = match tokio::fs::symlink_metadata(target).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(AcquisitionError::workdir(target, err)),
    };
    debug!(path = %target.display(), "removing stale checkout");
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(target).await
    } else {
        tokio::fs::remove_file(target).await
    };
    removed.map_err(|err| AcquisitionError::workdir(target, err))
}

/// Best-effort: grant the owner read access (and search access on directories)
/// to every entry. Returns how many entries were changed.
fn normalize_permissions(root: &Path) -> usize {
    let mut adjusted = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping entry during permission normalization");
                continue;
            }
        };
        if entry.path_is_symlink() {
            continue;
        }
        match ensure_owner_readable(entry.path(), entry.file_type().is_dir()) {
            Ok(true) => adjusted += 1,
            Ok(false) => {}
            Err(err) => debug!(path = %entry.path().display(), error = %err, "could not adjust permissions"),
        }
    }
    adjusted
}

#[cfg(unix)]
fn ensure_owner_readable(path: &Path, is_dir: bool) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::symlink_metadata(path)?.permissions().mode();
    let wanted = if is_dir { mode | 0o500 } else { mode | 0o400 };
    if wanted == mode {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(wanted))?;
    Ok(true)
}

#[cfg(not(unix))]
fn ensure_owner_readable(_path: &Path, _is_dir: bool) -> io::Result<bool> {
    Ok(false)
}
