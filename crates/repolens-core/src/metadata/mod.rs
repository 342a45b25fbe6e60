use std::{path::Path, sync::Arc};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::repository::RepositoryRef;

pub mod github;

/// Headline repository facts reported by the hosting service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySummary {
    pub full_name: String,
    pub description: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub open_issues_count: u64,
    pub language: Option<String>,
    pub owner: RepositoryOwner,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOwner {
    pub login: String,
}

/// Remote issue-tracker collaborator keyed by `owner/repo`.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Raw open issue records in the tracker's response order.
    async fn open_issues(&self, owner_repo: &str) -> AnyResult<Vec<Value>>;

    async fn summary(&self, owner_repo: &str) -> AnyResult<RepositorySummary>;
}

/// Side-channel collectors whose failures never reach the caller.
#[derive(Clone)]
pub struct MetadataCollector {
    tracker: Arc<dyn IssueTracker>,
}

impl MetadataCollector {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }

    /// Open issues, or an empty list when the tracker cannot be queried.
    pub async fn open_issues(&self, repo: &RepositoryRef) -> Vec<Value> {
        let Some(owner_repo) = repo.owner_repo() else {
            debug!(remote = %repo, "no owner/repo path; skipping issue fetch");
            return Vec::new();
        };
        match self.tracker.open_issues(&owner_repo).await {
            Ok(issues) => issues,
            Err(err) => {
                warn!(%owner_repo, error = %err, "issue fetch failed; reporting no issues");
                Vec::new()
            }
        }
    }

    pub async fn summary(&self, repo: &RepositoryRef) -> Option<RepositorySummary> {
        let owner_repo = repo.owner_repo()?;
        match self.tracker.summary(&owner_repo).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(%owner_repo, error = %err, "repository summary unavailable");
                None
            }
        }
    }
}

/// Contents of the top-level README (any case, any extension); empty when absent or unreadable.
pub async fn read_readme(root: &Path) -> String {
    let Ok(mut entries) = tokio::fs::read_dir(root).await else {
        return String::new();
    };
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && name.to_ascii_lowercase().starts_with("readme") {
            candidates.push((readme_rank(&name), name, entry.path()));
        }
    }
    candidates.sort();
    for (_, name, path) in candidates {
        match tokio::fs::read(&path).await {
            Ok(bytes) => return String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => debug!(%name, error = %err, "README unreadable"),
        }
    }
    String::new()
}

fn readme_rank(name: &str) -> u8 {
    match name.to_ascii_lowercase().as_str() {
        "readme.md" => 0,
        "readme" => 1,
        "readme.rst" | "readme.txt" => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use std::fs;

    struct FailingTracker;

    #[async_trait]
    impl IssueTracker for FailingTracker {
        async fn open_issues(&self, _owner_repo: &str) -> AnyResult<Vec<Value>> {
            Err(anyhow!("GitHub API error (503 Service Unavailable)"))
        }

        async fn summary(&self, _owner_repo: &str) -> AnyResult<RepositorySummary> {
            Err(anyhow!("GitHub API error (404 Not Found)"))
        }
    }

    struct FixedTracker;

    #[async_trait]
    impl IssueTracker for FixedTracker {
        async fn open_issues(&self, owner_repo: &str) -> AnyResult<Vec<Value>> {
            Ok(vec![json!({"number": 2, "repo": owner_repo}), json!({"number": 1})])
        }

        async fn summary(&self, owner_repo: &str) -> AnyResult<RepositorySummary> {
            Ok(RepositorySummary {
                full_name: owner_repo.to_string(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn tracker_failure_degrades_to_empty() {
        let collector = MetadataCollector::new(Arc::new(FailingTracker));
        let repo = RepositoryRef::parse("https://github.com/acme/widgets").unwrap();
        assert!(collector.open_issues(&repo).await.is_empty());
        assert!(collector.summary(&repo).await.is_none());
    }

    #[tokio::test]
    async fn issues_keep_tracker_order() {
        let collector = MetadataCollector::new(Arc::new(FixedTracker));
        let repo = RepositoryRef::parse("https://github.com/acme/widgets.git").unwrap();
        let issues = collector.open_issues(&repo).await;
        assert_eq!(issues[0]["number"], 2);
        assert_eq!(issues[0]["repo"], "acme/widgets");
        assert_eq!(issues[1]["number"], 1);
        assert_eq!(
            collector.summary(&repo).await.unwrap().full_name,
            "acme/widgets"
        );
    }

    #[tokio::test]
    async fn local_remotes_have_no_issues() {
        let collector = MetadataCollector::new(Arc::new(FixedTracker));
        let repo = RepositoryRef::parse("/srv/git/widgets").unwrap();
        assert!(collector.open_issues(&repo).await.is_empty());
    }

    #[tokio::test]
    async fn readme_lookup_prefers_markdown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_readme(dir.path()).await, "");

        fs::write(dir.path().join("README.txt"), "plain").unwrap();
        fs::write(dir.path().join("Readme.md"), "# Widgets").unwrap();
        fs::create_dir(dir.path().join("readme-assets")).unwrap();
        assert_eq!(read_readme(dir.path()).await, "# Widgets");
    }

    #[tokio::test]
    async fn missing_root_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_readme(&dir.path().join("absent")).await, "");
    }
}
